// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides quiet logging, shared issuer keys and ready-made protocol components
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors
#![allow(
    dead_code,
    clippy::expect_used,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `qtoken`
//!
//! Issuer keys are generated once per test binary; ML-DSA key generation dominates
//! test time otherwise.

use anyhow::Result;
use qtoken::crypto::IssuerKeys;
use qtoken::policy::{PolicyDocument, PolicyEngine, PolicyStore};
use qtoken::proof::{NonceCache, ProofSigner, ProofVerifier};
use qtoken::protocol::ResourceServer;
use qtoken::revocation::{
    InMemoryRevocationStore, RevocationRegistry, RevocationSettings, RevocationStore,
};
use qtoken::token::{TokenRequest, TokenValidator, ValidatorConfig};
use serde_json::json;
use std::sync::{Arc, Once, OnceLock};

pub const ISSUER: &str = "https://issuer.example";
pub const AUDIENCE: &str = "https://api.example";
pub const POLICY_ID: &str = "urn:qtoken:policy:projects";

static INIT_LOGGER: Once = Once::new();
static ISSUER_KEYS: OnceLock<Arc<IssuerKeys>> = OnceLock::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

/// Issuer keys shared by every test in the binary
pub fn issuer_keys() -> Arc<IssuerKeys> {
    ISSUER_KEYS
        .get_or_init(|| Arc::new(IssuerKeys::generate()))
        .clone()
}

/// Registry over a fresh in-memory store
pub async fn revocation_registry() -> Result<Arc<RevocationRegistry>> {
    registry_over(Arc::new(InMemoryRevocationStore::new()), RevocationSettings::default()).await
}

/// Registry over the given store
pub async fn registry_over(
    store: Arc<dyn RevocationStore>,
    settings: RevocationSettings,
) -> Result<Arc<RevocationRegistry>> {
    Ok(Arc::new(RevocationRegistry::initialize(store, settings).await?))
}

/// Validator for [`ISSUER`] and [`AUDIENCE`] over the shared keys
pub fn validator(registry: Arc<RevocationRegistry>) -> TokenValidator {
    TokenValidator::new(
        ValidatorConfig::new(ISSUER, AUDIENCE),
        issuer_keys().verification_keys(),
        registry,
    )
}

/// Token request bound to `client`
pub fn token_request(client: &ProofSigner) -> TokenRequest {
    TokenRequest::new("alice", ISSUER, vec![AUDIENCE.to_owned()], POLICY_ID)
        .with_client_key_hash(client.client_key_hash())
}

/// Project policy used across tests
///
/// - `read-projects`: anyone may read `projects/*`
/// - `admin-write`: subjects with `role=admin` may update and delete `projects/**`
/// - `secret-deny`: nobody touches `projects/secret`, whatever the role
pub fn projects_policy() -> PolicyDocument {
    serde_json::from_value(json!({
        "id": POLICY_ID,
        "version": 1,
        "issuer": ISSUER,
        "rules": [
            {"id": "read-projects", "effect": "allow", "priority": 10,
             "resources": ["projects/*"], "actions": ["read"]},
            {"id": "admin-write", "effect": "allow", "priority": 20,
             "resources": ["projects/**"], "actions": ["update", "delete"],
             "conditions": [{"type": "attribute", "source": "subject", "key": "role", "op": "eq", "value": "admin"}]},
            {"id": "secret-deny", "effect": "deny", "priority": 100,
             "resources": ["projects/secret"], "actions": ["*"]}
        ]
    }))
    .expect("valid policy document")
}

/// Resource server with the project policy loaded
pub async fn resource_server() -> Result<(ResourceServer, Arc<RevocationRegistry>)> {
    init_test_logging();
    let registry = revocation_registry().await?;
    let store = Arc::new(PolicyStore::new());
    store.load_policy(projects_policy()).await?;
    let server = ResourceServer::new(
        validator(registry.clone()),
        ProofVerifier::new(60, Arc::new(NonceCache::new())),
        Arc::new(PolicyEngine::new(store)),
    );
    Ok((server, registry))
}
