// ABOUTME: Evaluation context: subject, resource, action and environmental facts
// ABOUTME: Serializes canonically so decisions can be cached by context hash
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::conditions::TimeSensitivity;
use crate::crypto::hash::{sha256, Hash32};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

/// Who is acting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectContext {
    /// Subject identifier
    pub id: String,
    /// Subject attributes, typically the token's custom claims
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Device the request comes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceContext {
    /// Whether the device is managed or otherwise trusted
    pub trusted: bool,
    /// Platform name, e.g. `ios`, `linux`
    #[serde(default)]
    pub platform: Option<String>,
    /// Additional device attributes
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Most recent multi-factor authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaContext {
    /// Method used, e.g. `totp`, `webauthn`
    pub method: String,
    /// When the MFA step completed
    pub authenticated_at: DateTime<Utc>,
}

/// Environmental facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Evaluation time
    pub time: DateTime<Utc>,
    /// Client IP
    #[serde(default)]
    pub ip: Option<IpAddr>,
    /// Client device
    #[serde(default)]
    pub device: Option<DeviceContext>,
    /// MFA status
    #[serde(default)]
    pub mfa: Option<MfaContext>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            time: Utc::now(),
            ip: None,
            device: None,
            mfa: None,
        }
    }
}

/// Everything a policy decision may depend on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Acting subject
    pub subject: SubjectContext,
    /// Resource path
    pub resource: String,
    /// Requested action
    pub action: String,
    /// Environmental facts
    #[serde(default)]
    pub environment: Environment,
    /// Request context attributes
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EvaluationContext {
    /// Context for `subject` performing `action` on `resource` now
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: SubjectContext {
                id: subject.into(),
                attributes: Map::new(),
            },
            resource: resource.into(),
            action: action.into(),
            environment: Environment::default(),
            attributes: Map::new(),
        }
    }

    /// Set the evaluation time
    #[must_use]
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.environment.time = time;
        self
    }

    /// Set the client IP
    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.environment.ip = Some(ip);
        self
    }

    /// Set the device
    #[must_use]
    pub fn with_device(mut self, device: DeviceContext) -> Self {
        self.environment.device = Some(device);
        self
    }

    /// Set the MFA status
    #[must_use]
    pub fn with_mfa(mut self, method: impl Into<String>, authenticated_at: DateTime<Utc>) -> Self {
        self.environment.mfa = Some(MfaContext {
            method: method.into(),
            authenticated_at,
        });
        self
    }

    /// Add a subject attribute
    #[must_use]
    pub fn with_subject_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.subject.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a context attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// SHA-256 of the canonical JSON form; object keys are sorted
    #[must_use]
    pub fn digest(&self) -> Option<Hash32> {
        serde_json::to_vec(self).ok().map(|bytes| sha256(&bytes))
    }

    /// Digest with the time reduced to what a policy of `sensitivity` can observe
    ///
    /// Contexts that differ only below that resolution share a digest.
    #[must_use]
    pub fn digest_for(&self, sensitivity: TimeSensitivity) -> Option<Hash32> {
        let bucket = match sensitivity {
            TimeSensitivity::Exact => return self.digest(),
            TimeSensitivity::Minute => {
                DateTime::from_timestamp(self.environment.time.timestamp().div_euclid(60) * 60, 0)?
            }
            TimeSensitivity::Insensitive => DateTime::<Utc>::UNIX_EPOCH,
        };
        self.clone().at(bucket).digest()
    }
}

/// Look up a dotted path in a JSON object
#[must_use]
pub fn lookup_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = root.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
