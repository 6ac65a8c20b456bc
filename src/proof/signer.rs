// ABOUTME: Client-side proof signer holding an ephemeral Ed25519 key
// ABOUTME: Produces one fresh proof of possession per outbound request
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::message::{body_hash, ProofOfPossession};
use crate::crypto::hash::sha256;
use crate::crypto::signature::{Ed25519Signer, SignatureScheme, SigningScheme};
use crate::crypto::Hash32;
use crate::token::{token_hash, unix_now_ms};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use qtoken_core::constants::proof::NONCE_LEN;
use qtoken_core::errors::AppResult;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// Client proof key
///
/// The secret half is an `ed25519-dalek` signing key, which zeroizes itself on drop.
pub struct ProofSigner {
    key: Ed25519Signer,
}

impl ProofSigner {
    /// Fresh ephemeral key
    #[must_use]
    pub fn generate() -> Self {
        Self {
            key: Ed25519Signer::generate(),
        }
    }

    /// Restore from a 32-byte secret
    ///
    /// # Errors
    ///
    /// Returns `config-invalid` if the secret has the wrong length
    pub fn from_secret_bytes(secret: &[u8]) -> AppResult<Self> {
        Ok(Self {
            key: Ed25519Signer::from_secret_bytes(secret)?,
        })
    }

    /// Public key bytes
    #[must_use]
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.key.public_key_bytes()
    }

    /// Hash bound into tokens issued to this client
    #[must_use]
    pub fn client_key_hash(&self) -> Hash32 {
        sha256(&self.key.public_key_bytes())
    }

    /// Proof for a request at the current time
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails
    pub fn sign_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<&[u8]>,
        token: &str,
    ) -> AppResult<ProofOfPossession> {
        self.sign_request_at(method, uri, body, token, unix_now_ms())
    }

    /// Proof for a request as of `now_ms`
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails
    pub fn sign_request_at(
        &self,
        method: &str,
        uri: &str,
        body: Option<&[u8]>,
        token: &str,
        now_ms: u64,
    ) -> AppResult<ProofOfPossession> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut proof = ProofOfPossession {
            timestamp_ms: now_ms,
            nonce: URL_SAFE_NO_PAD.encode(nonce),
            method: method.to_ascii_uppercase(),
            uri: uri.to_owned(),
            body_hash: body_hash(body),
            token_hash: token_hash(token),
            signature: String::new(),
            public_key: URL_SAFE_NO_PAD.encode(self.key.public_key_bytes()),
        };
        let signature = self.key.sign(proof.canonical_message().as_bytes())?;
        proof.signature = URL_SAFE_NO_PAD.encode(signature);
        Ok(proof)
    }
}

impl fmt::Debug for ProofSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofSigner")
            .field("client_key_hash", &hex::encode(self.client_key_hash()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_nonce_per_proof() {
        let signer = ProofSigner::generate();
        let a = signer.sign_request_at("get", "/x", None, "tok", 1).unwrap();
        let b = signer.sign_request_at("get", "/x", None, "tok", 1).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(a.method, "GET");
        assert_eq!(a.token_hash, token_hash("tok"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = ProofSigner::generate();
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("client_key_hash"));
        assert!(!rendered.contains("key:"));
    }
}
