// ABOUTME: Policy document schema: rules, effects and typed conditions
// ABOUTME: JSON representation published by the policy store, immutable per version
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::crypto::hash::{sha256, Hash32};
use qtoken_core::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Rule outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Permit the action
    Allow,
    /// Refuse the action
    #[default]
    Deny,
}

impl Effect {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an attribute condition reads its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeSource {
    /// Subject attributes (token claims)
    Subject,
    /// Request context attributes
    Context,
}

/// Comparison operator for attribute conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Member of the given list
    In,
    /// Not a member of the given list
    NotIn,
    /// List contains the value, or string contains the substring
    Contains,
    /// String matches the regular expression
    Matches,
}

fn default_true() -> bool {
    true
}

/// Rule condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Time-of-day window, optionally restricted to days of the week
    TimeWindow {
        /// Start time, `HH:MM`
        start: String,
        /// End time (exclusive), `HH:MM`; earlier than `start` wraps past midnight
        end: String,
        /// Allowed days (`mon`..`sun`); empty means every day
        #[serde(default)]
        days: Vec<String>,
        /// Fixed UTC offset such as `+02:00`, or `UTC`
        #[serde(default)]
        timezone: Option<String>,
    },
    /// Client IP ranges; deny ranges win over allow ranges
    Ip {
        /// CIDR ranges the address must fall in (empty allows any)
        #[serde(default)]
        allow: Vec<String>,
        /// CIDR ranges the address must not fall in
        #[serde(default)]
        deny: Vec<String>,
    },
    /// Device requirements
    Device {
        /// Require a trusted (or untrusted) device
        #[serde(default)]
        trusted: Option<bool>,
        /// Allowed platforms; empty allows any
        #[serde(default)]
        platforms: Vec<String>,
        /// Device attributes that must be equal
        #[serde(default)]
        attributes: BTreeMap<String, serde_json::Value>,
    },
    /// Multi-factor authentication requirements
    Mfa {
        /// Whether MFA must have been performed
        #[serde(default = "default_true")]
        required: bool,
        /// Accepted methods; empty accepts any
        #[serde(default)]
        methods: Vec<String>,
        /// Maximum age of the MFA event, seconds
        #[serde(default)]
        max_age_secs: Option<u64>,
    },
    /// Generic attribute comparison
    Attribute {
        /// Attribute source
        source: AttributeSource,
        /// Dotted path into the source
        key: String,
        /// Operator
        op: ComparisonOp,
        /// Operand
        value: serde_json::Value,
    },
}

/// One authorization rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule id, unique within the document
    pub id: String,
    /// Effect when the rule matches
    pub effect: Effect,
    /// Resource glob patterns
    pub resources: Vec<String>,
    /// Action names, `*` for any
    pub actions: Vec<String>,
    /// Conditions, all of which must hold
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Higher priorities are evaluated first
    #[serde(default)]
    pub priority: i32,
}

/// Versioned policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Policy URN
    pub id: String,
    /// Version, a new version is a new document
    pub version: u64,
    /// Publisher
    pub issuer: String,
    /// Rules in document order
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Effect when no rule matches
    #[serde(default)]
    pub default_effect: Effect,
}

impl PolicyDocument {
    /// Parse from JSON
    ///
    /// # Errors
    ///
    /// Returns `policy-invalid` if the JSON does not match the schema
    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            qtoken_core::errors::AppError::policy_invalid(format!("invalid policy document: {e}"))
        })
    }

    /// Content digest used to detect republication with different content
    ///
    /// # Errors
    ///
    /// Returns `serialization-error` if the document cannot be serialized
    pub fn digest(&self) -> AppResult<Hash32> {
        Ok(sha256(&serde_json::to_vec(self)?))
    }
}
