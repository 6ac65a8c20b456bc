// ABOUTME: Token module: wire format, claims, builder and validator
// ABOUTME: Issues and validates dual-signed, encrypted, proof-bound tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! QToken issuance and validation

/// Token builder for issuing servers
pub mod builder;
/// Fixed-size token header
pub mod header;
/// Encrypted claim set
pub mod payload;
/// Validation state machine
pub mod validator;
/// Binary layout and transport encoding
pub mod wire;

pub use builder::{IssuedToken, TokenBuilder, TokenRequest};
pub use header::{TokenHeader, TokenType};
pub use payload::{ClaimValue, TokenPayload};
pub use validator::{TokenValidator, ValidatedToken, ValidationState, ValidatorConfig};
pub use wire::{hash_ip, token_hash, ProofBinding, QToken};

use chrono::Utc;

/// Current time in milliseconds since the Unix epoch
#[must_use]
pub fn unix_now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
