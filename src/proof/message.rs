// ABOUTME: Proof-of-possession object and its canonical signed message
// ABOUTME: Transported as base64url-encoded JSON in the proof header
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::crypto::hash::sha256_hex;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use qtoken_core::constants::proof::{MAX_ENCODED_PROOF_LEN, MESSAGE_DOMAIN};
use qtoken_core::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Per-request proof of possession
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfPossession {
    /// Creation time, milliseconds since the epoch
    pub timestamp_ms: u64,
    /// 16 random bytes, base64url
    pub nonce: String,
    /// HTTP method, uppercase
    pub method: String,
    /// Request URI (path and query)
    pub uri: String,
    /// SHA-256 hex of the request body, absent for empty bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_hash: Option<String>,
    /// SHA-256 hex of the transport-encoded token
    pub token_hash: String,
    /// Ed25519 signature over the canonical message, base64url
    pub signature: String,
    /// Client Ed25519 public key, base64url
    pub public_key: String,
}

impl ProofOfPossession {
    /// Canonical message covered by the signature
    #[must_use]
    pub fn canonical_message(&self) -> String {
        canonical_message(
            self.timestamp_ms,
            &self.nonce,
            &self.method,
            &self.uri,
            self.body_hash.as_deref(),
            &self.token_hash,
        )
    }

    /// Header encoding: base64url of the JSON object
    ///
    /// # Errors
    ///
    /// Returns `serialization-error` if JSON encoding fails
    pub fn encode(&self) -> AppResult<String> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    /// Decode the header form
    ///
    /// # Errors
    ///
    /// Returns `malformed-proof` for oversize, non-base64url or non-JSON input
    pub fn decode(encoded: &str) -> AppResult<Self> {
        let encoded = encoded.trim();
        if encoded.len() > MAX_ENCODED_PROOF_LEN {
            return Err(AppError::malformed_proof("proof exceeds maximum length"));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AppError::malformed_proof("proof is not valid base64url"))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::malformed_proof(format!("proof is not a valid object: {e}")))
    }
}

/// Build the canonical message
///
/// `domain \n timestamp \n nonce \n METHOD \n uri \n body-hash-or-empty \n token-hash`
#[must_use]
pub fn canonical_message(
    timestamp_ms: u64,
    nonce: &str,
    method: &str,
    uri: &str,
    body_hash: Option<&str>,
    token_hash: &str,
) -> String {
    format!(
        "{MESSAGE_DOMAIN}\n{timestamp_ms}\n{nonce}\n{}\n{uri}\n{}\n{token_hash}",
        method.to_ascii_uppercase(),
        body_hash.unwrap_or_default()
    )
}

/// Body hash as carried in proofs; empty bodies have none
#[must_use]
pub fn body_hash(body: Option<&[u8]>) -> Option<String> {
    body.filter(|b| !b.is_empty()).map(sha256_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_layout() {
        let message = canonical_message(12, "bm9uY2U", "post", "/a?b=1", None, "ff");
        assert_eq!(message, "qtoken-pop-v1\n12\nbm9uY2U\nPOST\n/a?b=1\n\nff");
    }

    #[test]
    fn test_empty_body_has_no_hash() {
        assert_eq!(body_hash(None), None);
        assert_eq!(body_hash(Some(b"")), None);
        assert_eq!(body_hash(Some(b"x")).map(|h| h.len()), Some(64));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ProofOfPossession::decode("!!!").is_err());
        let not_json = URL_SAFE_NO_PAD.encode(b"[1,2]");
        assert!(ProofOfPossession::decode(&not_json).is_err());
    }
}
