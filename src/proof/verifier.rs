// ABOUTME: Resource-server proof verifier binding a request to the token holder's key
// ABOUTME: Ordered checks from field equality to signature, with atomic nonce recording
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::message::{body_hash, ProofOfPossession};
use super::replay::NonceCache;
use crate::crypto::hash::{constant_time_eq, sha256};
use crate::crypto::signature::{Ed25519Verifier, SignatureScheme};
use crate::logging::AppLogger;
use crate::token::{hash_ip, unix_now_ms, ValidatedToken};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use qtoken_core::constants::proof::DEFAULT_WINDOW_SECS;
use qtoken_core::errors::{AppError, AppResult, ErrorCode};
use std::net::IpAddr;
use std::sync::Arc;

/// The incoming request a proof must match
#[derive(Debug, Clone, Copy)]
pub struct ProofRequest<'a> {
    /// HTTP method
    pub method: &'a str,
    /// Request URI (path and query)
    pub uri: &'a str,
    /// Request body, if any
    pub body: Option<&'a [u8]>,
    /// Peer address, checked when the token is IP-bound
    pub client_ip: Option<IpAddr>,
}

/// Verifies proofs of possession
#[derive(Debug, Clone)]
pub struct ProofVerifier {
    window_ms: u64,
    nonces: Arc<NonceCache>,
}

impl Default for ProofVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS, Arc::new(NonceCache::new()))
    }
}

impl ProofVerifier {
    /// Verifier accepting proofs within `window_secs` of now
    #[must_use]
    pub const fn new(window_secs: u64, nonces: Arc<NonceCache>) -> Self {
        Self {
            window_ms: window_secs.saturating_mul(1000),
            nonces,
        }
    }

    /// Replay cache in use
    #[must_use]
    pub const fn nonce_cache(&self) -> &Arc<NonceCache> {
        &self.nonces
    }

    /// Verify a proof at the current time
    ///
    /// # Errors
    ///
    /// Returns one of the proof error codes
    pub fn verify(
        &self,
        proof: &ProofOfPossession,
        request: &ProofRequest<'_>,
        token: &ValidatedToken,
    ) -> AppResult<()> {
        self.verify_at(proof, request, token, unix_now_ms())
    }

    /// Verify a proof as of `now_ms`
    ///
    /// # Errors
    ///
    /// Returns one of the proof error codes
    pub fn verify_at(
        &self,
        proof: &ProofOfPossession,
        request: &ProofRequest<'_>,
        token: &ValidatedToken,
        now_ms: u64,
    ) -> AppResult<()> {
        let result = self.check(proof, request, token, now_ms);
        if let Err(error) = &result {
            AppLogger::log_proof_rejected(error.code);
        }
        result
    }

    fn check(
        &self,
        proof: &ProofOfPossession,
        request: &ProofRequest<'_>,
        token: &ValidatedToken,
        now_ms: u64,
    ) -> AppResult<()> {
        // Request fields
        let method_matches = proof.method == request.method.to_ascii_uppercase();
        let body_matches = proof.body_hash == body_hash(request.body);
        if !method_matches
            || proof.uri != request.uri
            || !body_matches
            || proof.token_hash != token.token_hash
        {
            return Err(binding_mismatch("proof does not match this request"));
        }

        // Holder key
        if !token.binding.has_client_key() {
            return Err(binding_mismatch("token is not bound to a client key"));
        }
        let public_key = URL_SAFE_NO_PAD
            .decode(&proof.public_key)
            .map_err(|_| AppError::malformed_proof("proof public key is not base64url"))?;
        if !constant_time_eq(&sha256(&public_key), &token.binding.client_key_hash) {
            return Err(binding_mismatch("proof key is not the key bound to the token"));
        }

        // Network binding
        if token.binding.has_ip() {
            let ip_matches = request
                .client_ip
                .is_some_and(|ip| constant_time_eq(&hash_ip(ip), &token.binding.ip_hash));
            if !ip_matches {
                return Err(binding_mismatch("request address is not the bound address"));
            }
        }

        // Freshness
        if proof.timestamp_ms.abs_diff(now_ms) > self.window_ms {
            return Err(AppError::new(
                ErrorCode::ProofStale,
                "proof timestamp is outside the accepted window",
            ));
        }
        if self.nonces.contains(&proof.nonce, now_ms) {
            return Err(replayed());
        }

        // Signature
        let signature = URL_SAFE_NO_PAD
            .decode(&proof.signature)
            .map_err(|_| AppError::malformed_proof("proof signature is not base64url"))?;
        let verifier = Ed25519Verifier::from_bytes(&public_key)
            .map_err(|_| AppError::malformed_proof("proof public key is not an Ed25519 key"))?;
        if !verifier.verify(proof.canonical_message().as_bytes(), &signature) {
            return Err(AppError::from_code(ErrorCode::ProofSignatureInvalid));
        }

        // A proof is usable through timestamp + window inclusive, so remember the nonce that long
        let expires_at = proof.timestamp_ms.saturating_add(self.window_ms);
        if !self.nonces.record(&proof.nonce, expires_at, now_ms) {
            return Err(replayed());
        }
        Ok(())
    }
}

fn binding_mismatch(message: &str) -> AppError {
    AppError::new(ErrorCode::ProofBindingMismatch, message)
}

fn replayed() -> AppError {
    AppError::new(ErrorCode::ProofReplayed, "proof nonce was already used")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::ProofSigner;
    use crate::token::{ProofBinding, TokenHeader, TokenPayload, TokenType};
    use std::collections::BTreeMap;

    const NOW: u64 = 1_700_000_000_000;
    const TOKEN: &str = "encoded-token";

    fn validated(signer: &ProofSigner, ip: Option<IpAddr>) -> ValidatedToken {
        let binding = ProofBinding {
            client_key_hash: signer.client_key_hash(),
            ip_hash: ip.map_or([0u8; 32], hash_ip),
            ..ProofBinding::unbound()
        };
        ValidatedToken {
            header: TokenHeader::new(TokenType::Access, [0u8; 32], NOW),
            payload: TokenPayload {
                sub: "s".into(),
                iss: "i".into(),
                aud: vec!["a".into()],
                exp: NOW / 1000 + 60,
                iat: NOW / 1000,
                nbf: NOW / 1000,
                jti: String::new(),
                rid: String::new(),
                pol: String::new(),
                ctx: hex::encode(binding.context_hash()),
                cst: BTreeMap::new(),
            },
            binding,
            token_hash: crate::token::token_hash(TOKEN),
        }
    }

    fn request(body: Option<&[u8]>) -> ProofRequest<'_> {
        ProofRequest {
            method: "POST",
            uri: "/projects/1",
            body,
            client_ip: None,
        }
    }

    #[test]
    fn test_valid_proof_then_replay() {
        let signer = ProofSigner::generate();
        let token = validated(&signer, None);
        let verifier = ProofVerifier::default();
        let proof = signer
            .sign_request_at("post", "/projects/1", Some(b"{}"), TOKEN, NOW)
            .unwrap();

        verifier
            .verify_at(&proof, &request(Some(b"{}")), &token, NOW + 1_000)
            .unwrap();
        let error = verifier
            .verify_at(&proof, &request(Some(b"{}")), &token, NOW + 2_000)
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::ProofReplayed);
    }

    #[test]
    fn test_replay_rejected_at_last_fresh_instant() {
        let signer = ProofSigner::generate();
        let token = validated(&signer, None);
        let verifier = ProofVerifier::default();
        let window_ms = DEFAULT_WINDOW_SECS * 1000;
        let proof = signer
            .sign_request_at("POST", "/projects/1", None, TOKEN, NOW)
            .unwrap();

        verifier
            .verify_at(&proof, &request(None), &token, NOW + 1_000)
            .unwrap();
        let error = verifier
            .verify_at(&proof, &request(None), &token, NOW + window_ms)
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::ProofReplayed);

        let error = verifier
            .verify_at(&proof, &request(None), &token, NOW + window_ms + 1)
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::ProofStale);
    }

    #[test]
    fn test_request_mismatch_and_foreign_key() {
        let signer = ProofSigner::generate();
        let token = validated(&signer, None);
        let verifier = ProofVerifier::default();

        let proof = signer
            .sign_request_at("POST", "/projects/2", None, TOKEN, NOW)
            .unwrap();
        let error = verifier
            .verify_at(&proof, &request(None), &token, NOW)
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::ProofBindingMismatch);

        let thief = ProofSigner::generate();
        let forged = thief
            .sign_request_at("POST", "/projects/1", None, TOKEN, NOW)
            .unwrap();
        let error = verifier
            .verify_at(&forged, &request(None), &token, NOW)
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::ProofBindingMismatch);
    }

    #[test]
    fn test_tampered_signature() {
        let signer = ProofSigner::generate();
        let token = validated(&signer, None);
        let mut proof = signer
            .sign_request_at("POST", "/projects/1", None, TOKEN, NOW)
            .unwrap();
        proof.timestamp_ms += 1;

        let error = ProofVerifier::default()
            .verify_at(&proof, &request(None), &token, NOW)
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::ProofSignatureInvalid);
    }

    #[test]
    fn test_ip_binding() {
        let signer = ProofSigner::generate();
        let bound_ip: IpAddr = "203.0.113.9".parse().unwrap();
        let token = validated(&signer, Some(bound_ip));
        let verifier = ProofVerifier::default();

        let proof = signer
            .sign_request_at("POST", "/projects/1", None, TOKEN, NOW)
            .unwrap();
        let mut from_elsewhere = request(None);
        from_elsewhere.client_ip = Some("198.51.100.1".parse().unwrap());
        let error = verifier
            .verify_at(&proof, &from_elsewhere, &token, NOW)
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::ProofBindingMismatch);

        let mut from_bound = request(None);
        from_bound.client_ip = Some(bound_ip);
        verifier.verify_at(&proof, &from_bound, &token, NOW).unwrap();
    }
}
