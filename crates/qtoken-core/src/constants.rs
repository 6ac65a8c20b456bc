// ABOUTME: Protocol constants for the QToken wire format, proof messages and HTTP contract
// ABOUTME: Pure data constants organized by domain
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Constants module
//!
//! Sizes in [`wire`] are part of the bit-exact token layout and must never change within
//! a protocol version.

/// Wire layout of a serialized token
pub mod wire {
    /// Current protocol version written into the header
    pub const PROTOCOL_VERSION: u8 = 1;
    /// Fixed header size: version (1) + type (1) + key id (32) + timestamp (8)
    pub const HEADER_LEN: usize = 42;
    /// Key identifier length
    pub const KEY_ID_LEN: usize = 32;
    /// AEAD nonce length (`XChaCha20-Poly1305`)
    pub const NONCE_LEN: usize = 24;
    /// AEAD authentication tag length
    pub const TAG_LEN: usize = 16;
    /// Length of each hash inside the proof binding
    pub const BINDING_HASH_LEN: usize = 32;
    /// Fixed proof-binding size: three 32-byte hashes
    pub const PROOF_BINDING_LEN: usize = 96;
    /// Random token id (jti) length in bytes
    pub const TOKEN_ID_LEN: usize = 16;
    /// Random revocation id length in bytes
    pub const REVOCATION_ID_LEN: usize = 16;
    /// Symmetric payload key length
    pub const SYMMETRIC_KEY_LEN: usize = 32;
    /// Refuse to decode anything larger than this (base64url characters)
    pub const MAX_ENCODED_TOKEN_LEN: usize = 64 * 1024;
}

/// Signature scheme sizes
pub mod signatures {
    /// Ed25519 signature length
    pub const ED25519_SIGNATURE_LEN: usize = 64;
    /// Ed25519 public key length
    pub const ED25519_PUBLIC_KEY_LEN: usize = 32;
    /// ML-DSA-65 signature length
    pub const ML_DSA_65_SIGNATURE_LEN: usize = 3309;
    /// ML-DSA-65 public key length
    pub const ML_DSA_65_PUBLIC_KEY_LEN: usize = 1952;
}

/// Proof-of-possession constants
pub mod proof {
    /// Domain separation tag prefixed to every canonical proof message
    pub const MESSAGE_DOMAIN: &str = "qtoken-pop-v1";
    /// Random nonce length in bytes
    pub const NONCE_LEN: usize = 16;
    /// Default acceptance window (and replay cache TTL) in seconds
    pub const DEFAULT_WINDOW_SECS: u64 = 60;
    /// Refuse to decode proofs larger than this (base64url characters)
    pub const MAX_ENCODED_PROOF_LEN: usize = 8 * 1024;
}

/// HTTP contract between clients and resource servers
pub mod http {
    /// Authorization scheme marker: `Authorization: QToken <token>`
    pub const AUTH_SCHEME: &str = "QToken";
    /// Header carrying the encoded proof of possession
    pub const PROOF_HEADER: &str = "x-qtoken-proof";
    /// Header carrying the caller's device public key (base64url) when device binding is used
    pub const DEVICE_KEY_HEADER: &str = "x-qtoken-device-key";
}

/// Timing defaults
pub mod defaults {
    /// Default token validity in seconds
    pub const TOKEN_VALIDITY_SECS: u64 = 3600;
    /// Allowed header timestamp skew in seconds
    pub const CLOCK_SKEW_SECS: u64 = 300;
    /// Leeway applied to `exp` / `nbf` claims in seconds
    pub const CLAIM_LEEWAY_SECS: u64 = 0;
    /// Revocation snapshot refresh interval in seconds
    pub const REVOCATION_REFRESH_SECS: u64 = 300;
    /// Revocation authoritative lookup timeout in milliseconds
    pub const REVOCATION_TIMEOUT_MS: u64 = 500;
    /// Expected number of revoked ids used to size the bloom filter
    pub const BLOOM_EXPECTED_ITEMS: usize = 100_000;
    /// Target bloom filter false-positive rate
    pub const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.001;
    /// Policy fetch timeout in milliseconds
    pub const POLICY_FETCH_TIMEOUT_MS: u64 = 1000;
    /// Policy freshness when the store sends no max-age, in seconds
    pub const POLICY_MAX_AGE_SECS: u64 = 300;
    /// Policy decision cache capacity
    pub const DECISION_CACHE_SIZE: usize = 10_000;
}

/// Service names used in structured logs
pub mod service_names {
    /// Service name for structured logging
    pub const QTOKEN: &str = "qtoken";
}
