// ABOUTME: Pluggable signature scheme capability and the dual-signature combinator
// ABOUTME: One trait instantiated twice (classical + post-quantum) and AND-combined
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! # Signature Schemes
//!
//! Token integrity rests on two independent signatures over the same message. Rather
//! than hard-coding two algorithms into the validator, both halves are instances of
//! [`SignatureScheme`] (verification) and [`SigningScheme`] (issuance), combined by
//! [`DualSigner`] / [`DualVerifier`].
//!
//! The shipped instances are Ed25519 (classical) and ML-DSA-65 (post-quantum).

mod dual;
mod ed25519;
mod ml_dsa;

pub use dual::{DualSigner, DualVerifier};
pub use ed25519::{Ed25519Signer, Ed25519Verifier};
pub use ml_dsa::{MlDsa65Signer, MlDsa65Verifier};

use qtoken_core::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Algorithms known to the key file format
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    /// Ed25519 (RFC 8032)
    Ed25519,
    /// ML-DSA-65 (FIPS 204)
    MlDsa65,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519 => f.write_str("ed25519"),
            Self::MlDsa65 => f.write_str("ml-dsa-65"),
        }
    }
}

/// Verification half of a signature scheme (public material only)
pub trait SignatureScheme: Send + Sync {
    /// Algorithm implemented by this instance
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Fixed signature length in bytes
    fn signature_len(&self) -> usize;

    /// Encoded public key
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Verify `signature` over `message`; malformed signatures simply fail
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// Signing half of a signature scheme (holds secret material)
pub trait SigningScheme: SignatureScheme {
    /// Sign `message`, producing exactly `signature_len()` bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying signer fails
    fn sign(&self, message: &[u8]) -> AppResult<Vec<u8>>;
}
