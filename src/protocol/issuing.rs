// ABOUTME: Issuing-server side of the protocol: token issuance and revocation
// ABOUTME: Owns the secret issuer keys; hands out public verification material only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::crypto::{IssuerKeys, VerificationKeys};
use crate::revocation::{RevocationRecord, RevocationRegistry};
use crate::token::{IssuedToken, TokenBuilder, TokenRequest};
use qtoken_core::errors::AppResult;
use std::sync::Arc;

/// Issuing server
#[derive(Debug, Clone)]
pub struct IssuingServer {
    builder: TokenBuilder,
    revocation: Arc<RevocationRegistry>,
}

impl IssuingServer {
    /// Issuing server over `keys`, revoking through `revocation`
    #[must_use]
    pub const fn new(keys: Arc<IssuerKeys>, revocation: Arc<RevocationRegistry>) -> Self {
        Self {
            builder: TokenBuilder::new(keys),
            revocation,
        }
    }

    /// Override the default token validity
    #[must_use]
    pub fn with_default_validity(mut self, secs: u64) -> Self {
        self.builder = self.builder.with_default_validity(secs);
        self
    }

    /// Public material for resource servers
    #[must_use]
    pub fn verification_keys(&self) -> VerificationKeys {
        self.builder.keys().verification_keys()
    }

    /// Issue a token
    ///
    /// # Errors
    ///
    /// Returns `config-error` for incomplete requests
    pub fn issue(&self, request: &TokenRequest) -> AppResult<IssuedToken> {
        self.builder.build(request)
    }

    /// Revoke a token by its revocation id
    ///
    /// # Errors
    ///
    /// Returns `external-service-unavailable` if the revocation store does not accept the write
    pub async fn revoke(&self, revocation_id: &str, reason: &str) -> AppResult<RevocationRecord> {
        self.revocation.revoke(revocation_id, reason).await
    }
}
