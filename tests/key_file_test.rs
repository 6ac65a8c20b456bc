// ABOUTME: Integration tests for issuer and verification key files
// ABOUTME: Tokens issued with loaded keys validate under the exported public half
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use common::{revocation_registry, token_request, AUDIENCE, ISSUER};
use qtoken::crypto::{IssuerKeys, VerificationKeys};
use qtoken::errors::ErrorCode;
use qtoken::proof::ProofSigner;
use qtoken::token::{TokenBuilder, TokenValidator, ValidatorConfig};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_key_files_round_trip() -> Result<()> {
    common::init_test_logging();
    let dir = TempDir::new()?;
    let issuer_path = dir.path().join("issuer.json");
    let public_path = dir.path().join("public.json");

    let generated = IssuerKeys::generate();
    std::fs::write(&issuer_path, serde_json::to_vec(&generated.to_key_file())?)?;
    std::fs::write(
        &public_path,
        serde_json::to_vec(&generated.verification_keys().to_key_file())?,
    )?;

    let loaded = Arc::new(IssuerKeys::load(&issuer_path)?);
    assert_eq!(loaded.key_id(), generated.key_id());

    let public = VerificationKeys::load(&public_path)?;
    let public_file = std::fs::read_to_string(&public_path)?;
    assert!(!public_file.contains("secret_key"));

    let client = ProofSigner::generate();
    let issued = TokenBuilder::new(loaded).build(&token_request(&client))?;
    let validator = TokenValidator::new(
        ValidatorConfig::new(ISSUER, AUDIENCE),
        public,
        revocation_registry().await?,
    );
    let validated = validator.validate(&issued.token).await?;
    assert_eq!(validated.payload.jti, issued.payload.jti);
    Ok(())
}

#[test]
fn test_tampered_key_file_is_refused() {
    let keys = IssuerKeys::generate();
    let mut file = keys.to_key_file();
    file.key_id = "00".repeat(32);
    let error = IssuerKeys::from_key_file(&file).unwrap_err();
    assert_eq!(error.code, ErrorCode::ConfigInvalid);

    let mut public = keys.verification_keys().to_key_file();
    let stranger = IssuerKeys::generate().verification_keys().to_key_file();
    public.classical.public_key = stranger.classical.public_key;
    let error = VerificationKeys::from_key_file(&public).unwrap_err();
    assert_eq!(error.code, ErrorCode::ConfigInvalid);
}

#[test]
fn test_missing_key_file_is_config_error() {
    let missing = std::path::Path::new("/nonexistent/qtoken/issuer.json");
    let error = IssuerKeys::load(missing).unwrap_err();
    assert_eq!(error.code, ErrorCode::ConfigError);
    assert!(!error.message.contains("BEGIN"));
}
