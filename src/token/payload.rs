// ABOUTME: Token payload claims and the closed custom-claim value type
// ABOUTME: Serializes claims to canonical CBOR before encryption
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Token payload
//!
//! Field order is fixed by the struct declaration and custom claims live in a
//! `BTreeMap`, so the same claims always produce the same CBOR bytes.

use qtoken_core::errors::{AppError, AppResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Custom claim value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    /// Boolean
    Bool(bool),
    /// Signed integer
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list
    List(Vec<ClaimValue>),
    /// Nested map with sorted keys
    Map(BTreeMap<String, ClaimValue>),
}

impl ClaimValue {
    /// String content, if this is a string claim
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integer claim
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean content, if this is a boolean claim
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to JSON for policy evaluation
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Integer(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(v) => serde_json::Value::String(v.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ClaimValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for ClaimValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Plaintext claims carried inside the encrypted payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Subject identifier
    pub sub: String,
    /// Issuer URL
    pub iss: String,
    /// Audiences, at least one
    pub aud: Vec<String>,
    /// Expiry, seconds since the epoch
    pub exp: u64,
    /// Issued-at, seconds since the epoch
    pub iat: u64,
    /// Not-before, seconds since the epoch
    pub nbf: u64,
    /// Unique token id, 16 bytes hex
    pub jti: String,
    /// Revocation id, 16 bytes hex
    pub rid: String,
    /// Policy reference URN
    pub pol: String,
    /// Context hash binding the proof section, hex
    pub ctx: String,
    /// Custom claims
    #[serde(default)]
    pub cst: BTreeMap<String, ClaimValue>,
}

impl TokenPayload {
    /// Canonical CBOR encoding
    ///
    /// # Errors
    ///
    /// Returns `serialization-error` if CBOR encoding fails
    pub fn to_cbor(&self) -> AppResult<Zeroizing<Vec<u8>>> {
        let mut out = Zeroizing::new(Vec::with_capacity(256));
        ciborium::ser::into_writer(self, &mut *out)
            .map_err(|e| AppError::serialization(format!("payload encoding failed: {e}")))?;
        Ok(out)
    }

    /// Decode from CBOR
    ///
    /// Decode failures use the decryption code so a corrupted plaintext is not
    /// distinguishable from a bad tag.
    ///
    /// # Errors
    ///
    /// Returns `payload-decryption-failed` if the bytes are not a valid payload
    pub fn from_cbor(bytes: &[u8]) -> AppResult<Self> {
        ciborium::de::from_reader(bytes).map_err(|_| {
            AppError::new(
                ErrorCode::PayloadDecryptionFailed,
                "payload is not a valid claim set",
            )
        })
    }

    /// Check the temporal ordering invariants
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        self.exp > self.iat && self.nbf <= self.exp
    }

    /// Whether `audience` is among the token's audiences
    #[must_use]
    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|a| a == audience)
    }

    /// Custom claims as a JSON object
    #[must_use]
    pub fn custom_claims_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.cst
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}
