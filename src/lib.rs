// ABOUTME: Main library entry point for the QToken access-token protocol
// ABOUTME: Dual-signed encrypted tokens, proof of possession, revocation and policy evaluation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

#![deny(unsafe_code)]

//! # QToken
//!
//! A bearer-token replacement for distributed services. Tokens carry an
//! Ed25519 + ML-DSA-65 dual signature, an XChaCha20-Poly1305 encrypted claim set and a
//! proof binding that ties them to the client's key. Resource servers validate with
//! public material only, require a fresh proof of possession per request, check a
//! revocation registry and evaluate a context-aware policy before authorizing.
//!
//! ## Architecture
//!
//! - **crypto**: signature schemes, payload AEAD, hashing and key files
//! - **token**: wire format, builder and the validation state machine
//! - **proof**: client proof signer, server verifier and replay cache
//! - **revocation**: bloom-filter snapshot over an authoritative store
//! - **policy**: versioned policy documents and the rule engine
//! - **protocol**: issuing-server and resource-server facades
//! - **middleware**: axum request guard (feature `middleware`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use qtoken::crypto::IssuerKeys;
//! use qtoken::proof::ProofSigner;
//! use qtoken::token::{TokenBuilder, TokenRequest};
//! use std::sync::Arc;
//!
//! # fn main() -> qtoken::errors::AppResult<()> {
//! let keys = Arc::new(IssuerKeys::generate());
//! let client = ProofSigner::generate();
//! let request = TokenRequest::new(
//!     "alice",
//!     "https://issuer.example",
//!     vec!["https://api.example".to_owned()],
//!     "urn:qtoken:policy:projects",
//! )
//! .with_client_key_hash(client.client_key_hash());
//! let issued = TokenBuilder::new(keys).build(&request)?;
//! let proof = client.sign_request("GET", "/projects/apollo", None, &issued.token)?;
//! println!("Authorization: QToken {}", issued.token);
//! println!("X-QToken-Proof: {}", proof.encode()?);
//! # Ok(())
//! # }
//! ```

/// Environment configuration
pub mod config;
/// Cryptographic building blocks
pub mod crypto;
/// Shared HTTP clients for remote collaborators
pub mod http_client;
/// Structured logging setup and audit events
pub mod logging;
/// Axum middleware for resource servers
#[cfg(feature = "middleware")]
pub mod middleware;
/// Policy documents and evaluation
pub mod policy;
/// Proof of possession
pub mod proof;
/// Issuing and resource server facades
pub mod protocol;
/// Revocation registry
pub mod revocation;
/// Background task handles
pub mod tasks;
/// Token issuance and validation
pub mod token;

pub use qtoken_core::{constants, errors};
