// ABOUTME: Token builder assembling header, encrypted claims, dual signature and binding
// ABOUTME: Turns a TokenRequest into a transport-encoded token for the issuing server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::header::{TokenHeader, TokenType};
use super::payload::{ClaimValue, TokenPayload};
use super::wire::{hash_ip, ProofBinding, QToken};
use crate::crypto::hash::UNBOUND;
use crate::crypto::{Hash32, IssuerKeys};
use crate::logging::AppLogger;
use qtoken_core::constants::defaults::TOKEN_VALIDITY_SECS;
use qtoken_core::constants::wire::{REVOCATION_ID_LEN, TOKEN_ID_LEN};
use qtoken_core::errors::{AppError, AppResult};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Parameters for issuing one token
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    /// Subject identifier
    pub subject: String,
    /// Issuer URL
    pub issuer: String,
    /// Audiences, at least one
    pub audiences: Vec<String>,
    /// Policy reference URN, optionally pinned with `@version`
    pub policy_ref: String,
    /// Validity in seconds; the builder default applies when unset
    pub validity_secs: Option<u64>,
    /// Token type
    pub token_type: TokenType,
    /// Hash of the device key the token is bound to
    pub device_key_hash: Option<Hash32>,
    /// Hash of the client proof public key
    pub client_key_hash: Option<Hash32>,
    /// Client IP the token is bound to
    pub client_ip: Option<IpAddr>,
    /// Delay before the token becomes valid, in seconds
    pub not_before_offset_secs: u64,
    /// Custom claims
    pub custom_claims: BTreeMap<String, ClaimValue>,
}

impl TokenRequest {
    /// Request with the required fields
    pub fn new(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        audiences: Vec<String>,
        policy_ref: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            audiences,
            policy_ref: policy_ref.into(),
            ..Self::default()
        }
    }

    /// Set the validity duration
    #[must_use]
    pub fn with_validity(mut self, secs: u64) -> Self {
        self.validity_secs = Some(secs);
        self
    }

    /// Set the token type
    #[must_use]
    pub fn with_token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    /// Bind to a client proof key hash
    #[must_use]
    pub fn with_client_key_hash(mut self, hash: Hash32) -> Self {
        self.client_key_hash = Some(hash);
        self
    }

    /// Bind to a device key hash
    #[must_use]
    pub fn with_device_key_hash(mut self, hash: Hash32) -> Self {
        self.device_key_hash = Some(hash);
        self
    }

    /// Bind to a client IP
    #[must_use]
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Delay validity by `secs`
    #[must_use]
    pub fn with_not_before_offset(mut self, secs: u64) -> Self {
        self.not_before_offset_secs = secs;
        self
    }

    /// Add a custom claim
    #[must_use]
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.custom_claims.insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> AppResult<()> {
        if self.subject.trim().is_empty() {
            return Err(AppError::config("token subject must not be empty"));
        }
        if self.issuer.trim().is_empty() {
            return Err(AppError::config("token issuer must not be empty"));
        }
        if self.audiences.is_empty() || self.audiences.iter().any(|a| a.trim().is_empty()) {
            return Err(AppError::config(
                "token requires at least one non-empty audience",
            ));
        }
        if self.policy_ref.trim().is_empty() {
            return Err(AppError::config("token policy reference must not be empty"));
        }
        Ok(())
    }
}

/// A freshly issued token and the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Transport-encoded token
    pub token: String,
    /// Plain header
    pub header: TokenHeader,
    /// Claims sealed inside the token
    pub payload: TokenPayload,
}

/// Builds tokens with the issuer's keys
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    keys: Arc<IssuerKeys>,
    default_validity_secs: u64,
}

impl TokenBuilder {
    /// Builder with the default validity of one hour
    #[must_use]
    pub const fn new(keys: Arc<IssuerKeys>) -> Self {
        Self {
            keys,
            default_validity_secs: TOKEN_VALIDITY_SECS,
        }
    }

    /// Override the validity used when a request does not set one
    #[must_use]
    pub fn with_default_validity(mut self, secs: u64) -> Self {
        self.default_validity_secs = secs;
        self
    }

    /// Issuer keys in use
    #[must_use]
    pub const fn keys(&self) -> &Arc<IssuerKeys> {
        &self.keys
    }

    /// Issue a token at the current time
    ///
    /// # Errors
    ///
    /// Returns `config-error` for incomplete requests, or a crypto error if sealing fails
    pub fn build(&self, request: &TokenRequest) -> AppResult<IssuedToken> {
        self.build_at(request, super::unix_now_ms())
    }

    /// Issue a token as of `now_ms` milliseconds since the epoch
    ///
    /// # Errors
    ///
    /// Returns `config-error` for incomplete requests, or a crypto error if sealing fails
    pub fn build_at(&self, request: &TokenRequest, now_ms: u64) -> AppResult<IssuedToken> {
        request.validate()?;

        let validity = request.validity_secs.unwrap_or(self.default_validity_secs);
        if validity == 0 {
            return Err(AppError::config("token validity must be greater than zero"));
        }
        if request.not_before_offset_secs >= validity {
            return Err(AppError::config(
                "not-before offset must be shorter than the validity period",
            ));
        }

        let iat = now_ms / 1000;
        let exp = iat
            .checked_add(validity)
            .ok_or_else(|| AppError::config("token validity overflows the clock"))?;

        let binding = ProofBinding {
            device_key_hash: request.device_key_hash.unwrap_or(UNBOUND),
            client_key_hash: request.client_key_hash.unwrap_or(UNBOUND),
            ip_hash: request.client_ip.map_or(UNBOUND, hash_ip),
        };

        let header = TokenHeader::new(request.token_type, *self.keys.key_id(), now_ms);
        let payload = TokenPayload {
            sub: request.subject.clone(),
            iss: request.issuer.clone(),
            aud: request.audiences.clone(),
            exp,
            iat,
            nbf: iat + request.not_before_offset_secs,
            jti: random_hex::<TOKEN_ID_LEN>(),
            rid: random_hex::<REVOCATION_ID_LEN>(),
            pol: request.policy_ref.clone(),
            ctx: hex::encode(binding.context_hash()),
            cst: request.custom_claims.clone(),
        };

        let header_bytes = header.encode();
        let plaintext = payload.to_cbor()?;
        let encrypted_payload = self.keys.cipher().encrypt(&plaintext, &header_bytes)?;

        let mut token = QToken {
            header,
            encrypted_payload,
            signature: Vec::new(),
            binding,
        };
        token.signature = self.keys.signer().sign(&token.signed_message())?;

        AppLogger::log_token_issued(
            &payload.jti,
            request.token_type.as_str(),
            &self.keys.key_id_hex(),
            exp,
        );

        Ok(IssuedToken {
            token: token.encode(),
            header,
            payload,
        })
    }
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtoken_core::errors::ErrorCode;
    use std::sync::OnceLock;

    fn keys() -> Arc<IssuerKeys> {
        static KEYS: OnceLock<Arc<IssuerKeys>> = OnceLock::new();
        KEYS.get_or_init(|| Arc::new(IssuerKeys::generate())).clone()
    }

    fn request() -> TokenRequest {
        TokenRequest::new(
            "user-1",
            "https://issuer.example",
            vec!["api".into()],
            "urn:qtoken:policy:default",
        )
    }

    #[test]
    fn test_required_fields() {
        let builder = TokenBuilder::new(keys());
        for broken in [
            TokenRequest {
                subject: String::new(),
                ..request()
            },
            TokenRequest {
                issuer: " ".into(),
                ..request()
            },
            TokenRequest {
                audiences: Vec::new(),
                ..request()
            },
            TokenRequest {
                policy_ref: String::new(),
                ..request()
            },
            request().with_validity(0),
        ] {
            let error = builder.build(&broken).unwrap_err();
            assert_eq!(error.code, ErrorCode::ConfigError);
        }
    }

    #[test]
    fn test_claims_and_uniqueness() {
        let builder = TokenBuilder::new(keys()).with_default_validity(600);
        let first = builder.build_at(&request(), 1_700_000_000_123).unwrap();
        let second = builder.build_at(&request(), 1_700_000_000_123).unwrap();

        assert_eq!(first.payload.iat, 1_700_000_000);
        assert_eq!(first.payload.exp, 1_700_000_600);
        assert_eq!(first.header.created_at_ms, 1_700_000_000_123);
        assert_eq!(first.payload.jti.len(), 32);
        assert_ne!(first.payload.jti, second.payload.jti);
        assert_ne!(first.payload.rid, second.payload.rid);
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn test_binding_is_hashed_into_context() {
        let builder = TokenBuilder::new(keys());
        let bound = request()
            .with_client_key_hash([4u8; 32])
            .with_client_ip("10.0.0.1".parse().unwrap());
        let issued = builder.build(&bound).unwrap();

        let expected = ProofBinding {
            device_key_hash: UNBOUND,
            client_key_hash: [4u8; 32],
            ip_hash: hash_ip("10.0.0.1".parse().unwrap()),
        };
        assert_eq!(issued.payload.ctx, hex::encode(expected.context_hash()));
    }
}
