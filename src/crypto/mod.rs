// ABOUTME: Cryptography module: signature schemes, payload AEAD, hashing and key management
// ABOUTME: Centralizes all cryptographic operations of the token protocol
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Cryptographic building blocks for QToken

/// XChaCha20-Poly1305 payload encryption
pub mod aead;
/// SHA-256 helpers
pub mod hash;
/// Issuer and verification key management
pub mod keys;
/// Signature scheme capability and dual signatures
pub mod signature;

pub use aead::PayloadCipher;
pub use hash::{sha256, sha256_hex, Hash32};
pub use keys::{IssuerKeyFile, IssuerKeys, VerificationKeyFile, VerificationKeys};
pub use signature::{
    DualSigner, DualVerifier, SignatureAlgorithm, SignatureScheme, SigningScheme,
};
