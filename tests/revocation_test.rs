// ABOUTME: Integration tests for token revocation through the issuing and resource servers
// ABOUTME: Covers immediate effect, refresh from a shared store and failure modes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use async_trait::async_trait;
use common::{issuer_keys, registry_over, revocation_registry, token_request, validator};
use qtoken::errors::{AppError, AppResult, ErrorCode};
use qtoken::proof::ProofSigner;
use qtoken::protocol::IssuingServer;
use qtoken::revocation::{
    InMemoryRevocationStore, RevocationFailureMode, RevocationRecord, RevocationSettings,
    RevocationStore,
};
use std::sync::Arc;
use std::time::Duration;

/// Lists a fixed revoked set but cannot answer point lookups
struct LookupDownStore {
    listed: Vec<String>,
}

#[async_trait]
impl RevocationStore for LookupDownStore {
    async fn revoke(&self, _record: RevocationRecord) -> AppResult<()> {
        Err(AppError::unavailable("revocation-store", "read only"))
    }

    async fn lookup(&self, _revocation_id: &str) -> AppResult<Option<RevocationRecord>> {
        Err(AppError::unavailable("revocation-store", "connection refused"))
    }

    async fn list_revoked(&self) -> AppResult<Vec<String>> {
        Ok(self.listed.clone())
    }
}

#[tokio::test]
async fn test_revocation_takes_effect_immediately() -> Result<()> {
    common::init_test_logging();
    let registry = revocation_registry().await?;
    let issuing = IssuingServer::new(issuer_keys(), registry.clone());
    let client = ProofSigner::generate();
    let issued = issuing.issue(&token_request(&client))?;
    let validator = validator(registry);

    validator.validate(&issued.token).await?;
    issuing.revoke(&issued.payload.rid, "device lost").await?;
    let error = validator.validate(&issued.token).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::TokenRevoked);

    let other = issuing.issue(&token_request(&client))?;
    validator.validate(&other.token).await?;
    Ok(())
}

#[tokio::test]
async fn test_second_registry_sees_revocation_after_refresh() -> Result<()> {
    let store: Arc<InMemoryRevocationStore> = Arc::new(InMemoryRevocationStore::new());
    let issuing_registry = registry_over(store.clone(), RevocationSettings::default()).await?;
    let resource_registry = registry_over(store, RevocationSettings::default()).await?;
    let issuing = IssuingServer::new(issuer_keys(), issuing_registry);
    let client = ProofSigner::generate();
    let issued = issuing.issue(&token_request(&client))?;
    let validator = validator(resource_registry.clone());

    issuing.revoke(&issued.payload.rid, "compromised").await?;
    // Bloom snapshot is stale until the next refresh, but the strong path is not
    assert!(resource_registry.is_revoked_strong(&issued.payload.rid).await?);

    resource_registry.refresh().await?;
    let error = validator.validate(&issued.token).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::TokenRevoked);
    Ok(())
}

#[tokio::test]
async fn test_revoking_empty_id_is_rejected() -> Result<()> {
    let registry = revocation_registry().await?;
    let error = registry.revoke("  ", "typo").await.unwrap_err();
    assert_eq!(error.code, ErrorCode::ConfigError);
    Ok(())
}

async fn outcome_with_lookup_down(mode: RevocationFailureMode) -> Result<AppResult<()>> {
    let client = ProofSigner::generate();
    let issued = IssuingServer::new(issuer_keys(), revocation_registry().await?)
        .issue(&token_request(&client))?;
    let store = Arc::new(LookupDownStore {
        listed: vec![issued.payload.rid.clone()],
    });
    let settings = RevocationSettings {
        failure_mode: mode,
        lookup_timeout: Duration::from_millis(200),
        ..RevocationSettings::default()
    };
    let validator = validator(registry_over(store, settings).await?);
    Ok(validator.validate(&issued.token).await.map(|_| ()))
}

#[tokio::test]
async fn test_fail_closed_rejects_when_store_is_down() -> Result<()> {
    let result = outcome_with_lookup_down(RevocationFailureMode::FailClosed).await?;
    let error = result.unwrap_err();
    assert_eq!(error.code, ErrorCode::ExternalServiceUnavailable);
    assert!(error.code.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_fail_open_accepts_when_store_is_down() -> Result<()> {
    let result = outcome_with_lookup_down(RevocationFailureMode::FailOpen).await?;
    assert!(result.is_ok());
    Ok(())
}
