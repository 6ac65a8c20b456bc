// ABOUTME: Proof-of-possession module: client signer, server verifier and replay cache
// ABOUTME: Binds each request to the private key the token was issued for
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Proof of possession
//!
//! A captured token is useless without the client's private key: every request carries
//! a fresh proof signed with that key over the method, URI, body hash and token hash.

/// Proof object and canonical message
pub mod message;
/// Nonce replay cache
pub mod replay;
/// Client-side signer
pub mod signer;
/// Server-side verifier
pub mod verifier;

pub use message::{body_hash, canonical_message, ProofOfPossession};
pub use replay::NonceCache;
pub use signer::ProofSigner;
pub use verifier::{ProofRequest, ProofVerifier};
