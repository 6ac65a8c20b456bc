// ABOUTME: Binary token layout: header, encrypted payload, dual signature and proof binding
// ABOUTME: Handles base64url transport encoding and length-checked parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Wire format
//!
//! ```text
//! header (42) | nonce (24) ciphertext tag (16) | classical sig | pq sig | binding (96)
//! ```
//!
//! There is no length prefix: the signature length is fixed by the configured scheme
//! pair, so the payload length is whatever remains.

use super::header::TokenHeader;
use crate::crypto::hash::{is_bound, sha256, sha256_hex, UNBOUND};
use crate::crypto::Hash32;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use qtoken_core::constants::wire::{
    BINDING_HASH_LEN, HEADER_LEN, MAX_ENCODED_TOKEN_LEN, NONCE_LEN, PROOF_BINDING_LEN, TAG_LEN,
};
use qtoken_core::errors::{AppError, AppResult};
use std::net::IpAddr;

/// Proof-of-possession binding section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProofBinding {
    /// SHA-256 of the device key, zero when unbound
    pub device_key_hash: Hash32,
    /// SHA-256 of the client's proof public key, zero when unbound
    pub client_key_hash: Hash32,
    /// SHA-256 of the bound client IP, zero when unbound
    pub ip_hash: Hash32,
}

impl ProofBinding {
    /// Binding with every hash unset
    #[must_use]
    pub const fn unbound() -> Self {
        Self {
            device_key_hash: UNBOUND,
            client_key_hash: UNBOUND,
            ip_hash: UNBOUND,
        }
    }

    /// Fixed 96-byte layout: device, client, ip
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PROOF_BINDING_LEN] {
        let mut out = [0u8; PROOF_BINDING_LEN];
        out[..BINDING_HASH_LEN].copy_from_slice(&self.device_key_hash);
        out[BINDING_HASH_LEN..2 * BINDING_HASH_LEN].copy_from_slice(&self.client_key_hash);
        out[2 * BINDING_HASH_LEN..].copy_from_slice(&self.ip_hash);
        out
    }

    /// Parse the fixed layout
    ///
    /// # Errors
    ///
    /// Returns `malformed-token` if the slice is not 96 bytes
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() != PROOF_BINDING_LEN {
            return Err(AppError::malformed_token("proof binding must be 96 bytes"));
        }
        let mut binding = Self::unbound();
        binding
            .device_key_hash
            .copy_from_slice(&bytes[..BINDING_HASH_LEN]);
        binding
            .client_key_hash
            .copy_from_slice(&bytes[BINDING_HASH_LEN..2 * BINDING_HASH_LEN]);
        binding
            .ip_hash
            .copy_from_slice(&bytes[2 * BINDING_HASH_LEN..]);
        Ok(binding)
    }

    /// Context hash stored in the payload to authenticate this section
    #[must_use]
    pub fn context_hash(&self) -> Hash32 {
        sha256(&self.to_bytes())
    }

    /// Whether a client proof key is bound
    #[must_use]
    pub fn has_client_key(&self) -> bool {
        is_bound(&self.client_key_hash)
    }

    /// Whether a device key is bound
    #[must_use]
    pub fn has_device_key(&self) -> bool {
        is_bound(&self.device_key_hash)
    }

    /// Whether a client IP is bound
    #[must_use]
    pub fn has_ip(&self) -> bool {
        is_bound(&self.ip_hash)
    }
}

/// Parsed, not yet verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QToken {
    /// Plain header, also the AEAD associated data
    pub header: TokenHeader,
    /// Nonce, ciphertext and tag
    pub encrypted_payload: Vec<u8>,
    /// Classical signature followed by the post-quantum signature
    pub signature: Vec<u8>,
    /// Proof binding section
    pub binding: ProofBinding,
}

impl QToken {
    /// Bytes covered by the dual signature
    #[must_use]
    pub fn signed_message(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(HEADER_LEN + self.encrypted_payload.len());
        message.extend_from_slice(&self.header.encode());
        message.extend_from_slice(&self.encrypted_payload);
        message
    }

    /// Raw binary form
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_LEN + self.encrypted_payload.len() + self.signature.len() + PROOF_BINDING_LEN,
        );
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.encrypted_payload);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.binding.to_bytes());
        out
    }

    /// Transport encoding: base64url without padding
    #[must_use]
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    /// Parse the raw binary form given the configured signature length
    ///
    /// # Errors
    ///
    /// Returns `malformed-token` on length errors, or the header codes
    pub fn from_bytes(bytes: &[u8], signature_len: usize) -> AppResult<Self> {
        let minimum = HEADER_LEN + NONCE_LEN + TAG_LEN + signature_len + PROOF_BINDING_LEN;
        if bytes.len() < minimum {
            return Err(AppError::malformed_token(format!(
                "token is {} bytes, minimum is {minimum}",
                bytes.len()
            )));
        }

        let (header_bytes, rest) = bytes.split_at(HEADER_LEN);
        let header = TokenHeader::decode(header_bytes)?;

        let payload_len = rest.len() - signature_len - PROOF_BINDING_LEN;
        let (encrypted_payload, rest) = rest.split_at(payload_len);
        let (signature, binding_bytes) = rest.split_at(signature_len);

        Ok(Self {
            header,
            encrypted_payload: encrypted_payload.to_vec(),
            signature: signature.to_vec(),
            binding: ProofBinding::from_bytes(binding_bytes)?,
        })
    }

    /// Parse the transport encoding
    ///
    /// # Errors
    ///
    /// Returns `malformed-token` for oversize input or invalid base64url
    pub fn parse(encoded: &str, signature_len: usize) -> AppResult<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(AppError::malformed_token("token is empty"));
        }
        if encoded.len() > MAX_ENCODED_TOKEN_LEN {
            return Err(AppError::malformed_token("token exceeds maximum length"));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AppError::malformed_token("token is not valid base64url"))?;
        Self::from_bytes(&bytes, signature_len)
    }
}

/// Hash of a client IP for the binding section
///
/// IPv4-mapped IPv6 addresses hash as their IPv4 form so dual-stack listeners agree.
#[must_use]
pub fn hash_ip(ip: IpAddr) -> Hash32 {
    let canonical = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        IpAddr::V4(_) => ip,
    };
    sha256(canonical.to_string().as_bytes())
}

/// SHA-256 hex of the transport-encoded token, as carried in proofs
#[must_use]
pub fn token_hash(encoded: &str) -> String {
    sha256_hex(encoded.trim().as_bytes())
}
