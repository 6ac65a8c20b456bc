// ABOUTME: SHA-256 helpers used for key ids, proof bindings and request digests
// ABOUTME: Includes constant-time comparison for binding hashes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use qtoken_core::constants::wire::BINDING_HASH_LEN;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A 32-byte SHA-256 digest
pub type Hash32 = [u8; BINDING_HASH_LEN];

/// All-zero hash marking an unbound proof-binding slot
pub const UNBOUND: Hash32 = [0u8; BINDING_HASH_LEN];

/// SHA-256 of a single byte slice
#[must_use]
pub fn sha256(data: &[u8]) -> Hash32 {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of several slices
#[must_use]
pub fn sha256_concat(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Lowercase hex SHA-256 of a byte slice
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Constant-time equality for digests and binding hashes
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Whether a binding slot carries a real hash
#[must_use]
pub fn is_bound(hash: &Hash32) -> bool {
    !constant_time_eq(hash, &UNBOUND)
}
