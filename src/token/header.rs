// ABOUTME: Fixed 42-byte token header: version, token type, key id and creation time
// ABOUTME: Encodes and decodes the header that doubles as AEAD associated data
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::crypto::Hash32;
use qtoken_core::constants::wire::{HEADER_LEN, KEY_ID_LEN, PROTOCOL_VERSION};
use qtoken_core::errors::{AppError, AppResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of token, encoded as a single byte on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TokenType {
    /// Resource access token
    #[default]
    Access = 1,
    /// Refresh token
    Refresh = 2,
    /// Identity assertion
    Identity = 3,
    /// Device-bound token
    Device = 4,
}

impl TokenType {
    /// Wire byte for this token type
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse the wire byte, rejecting values outside the known set
    ///
    /// # Errors
    ///
    /// Returns `invalid-token-type` for unknown bytes
    pub fn from_byte(byte: u8) -> AppResult<Self> {
        match byte {
            1 => Ok(Self::Access),
            2 => Ok(Self::Refresh),
            3 => Ok(Self::Identity),
            4 => Ok(Self::Device),
            other => Err(AppError::new(
                ErrorCode::InvalidTokenType,
                format!("unknown token type byte {other}"),
            )),
        }
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Identity => "identity",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "access" => Ok(Self::Access),
            "refresh" => Ok(Self::Refresh),
            "identity" => Ok(Self::Identity),
            "device" => Ok(Self::Device),
            other => Err(AppError::new(
                ErrorCode::InvalidTokenType,
                format!("unknown token type '{other}'"),
            )),
        }
    }
}

/// Token header
///
/// Layout: `version (1) | token_type (1) | key_id (32) | created_at_ms (8, big-endian)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHeader {
    /// Protocol version, always 1
    pub version: u8,
    /// Token type
    pub token_type: TokenType,
    /// Issuer key identifier
    pub key_id: Hash32,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at_ms: u64,
}

impl TokenHeader {
    /// Header for the current protocol version
    #[must_use]
    pub const fn new(token_type: TokenType, key_id: Hash32, created_at_ms: u64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token_type,
            key_id,
            created_at_ms,
        }
    }

    /// Serialize to the fixed wire layout
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.version;
        out[1] = self.token_type.as_byte();
        out[2..2 + KEY_ID_LEN].copy_from_slice(&self.key_id);
        out[2 + KEY_ID_LEN..].copy_from_slice(&self.created_at_ms.to_be_bytes());
        out
    }

    /// Parse the fixed wire layout
    ///
    /// Version is checked before the type byte so an unknown version is never
    /// reported as a type error.
    ///
    /// # Errors
    ///
    /// Returns `malformed-token`, `invalid-version` or `invalid-token-type`
    pub fn decode(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() != HEADER_LEN {
            return Err(AppError::malformed_token(format!(
                "header must be {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != PROTOCOL_VERSION {
            return Err(AppError::new(
                ErrorCode::InvalidVersion,
                format!("unsupported protocol version {}", bytes[0]),
            ));
        }
        let token_type = TokenType::from_byte(bytes[1])?;

        let mut key_id = [0u8; KEY_ID_LEN];
        key_id.copy_from_slice(&bytes[2..2 + KEY_ID_LEN]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[2 + KEY_ID_LEN..]);

        Ok(Self {
            version: bytes[0],
            token_type,
            key_id,
            created_at_ms: u64::from_be_bytes(timestamp),
        })
    }
}
