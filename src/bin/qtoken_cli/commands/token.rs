// ABOUTME: Token commands for qtoken-cli
// ABOUTME: Issue, inspect and validate operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::helpers::args::{hash32, key_value};
use crate::helpers::display::{display_issued_token, display_token_structure};
use qtoken::constants::signatures::{ED25519_SIGNATURE_LEN, ML_DSA_65_SIGNATURE_LEN};
use qtoken::crypto::{IssuerKeys, VerificationKeys};
use qtoken::errors::AppResult;
use qtoken::revocation::{InMemoryRevocationStore, RevocationRegistry, RevocationSettings};
use qtoken::token::{
    ClaimValue, QToken, TokenBuilder, TokenPayload, TokenRequest, TokenType, TokenValidator,
    ValidatorConfig,
};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Arguments of `issue`
pub struct IssueArgs {
    pub subject: String,
    pub issuer: String,
    pub audiences: Vec<String>,
    pub policy: String,
    pub validity: Option<u64>,
    pub token_type: TokenType,
    pub client_key_hash: Option<String>,
    pub device_key_hash: Option<String>,
    pub client_ip: Option<IpAddr>,
    pub not_before: u64,
    pub claims: Vec<String>,
}

impl IssueArgs {
    fn into_request(self) -> AppResult<TokenRequest> {
        let mut request = TokenRequest::new(self.subject, self.issuer, self.audiences, self.policy)
            .with_token_type(self.token_type)
            .with_not_before_offset(self.not_before);
        if let Some(validity) = self.validity {
            request = request.with_validity(validity);
        }
        if let Some(hash) = self.client_key_hash {
            request = request.with_client_key_hash(hash32(&hash, "client key hash")?);
        }
        if let Some(hash) = self.device_key_hash {
            request = request.with_device_key_hash(hash32(&hash, "device key hash")?);
        }
        if let Some(ip) = self.client_ip {
            request = request.with_client_ip(ip);
        }
        for raw in &self.claims {
            let (key, value) = key_value(raw)?;
            let value: ClaimValue = serde_json::from_value(value)?;
            request = request.with_claim(key, value);
        }
        Ok(request)
    }
}

/// Issue a token with the issuer key file
pub fn issue(keys: &Path, args: IssueArgs) -> AppResult<()> {
    let keys = Arc::new(IssuerKeys::load(keys)?);
    if args.client_key_hash.is_none() {
        warn!("Issuing a token without a client key; resource servers will reject its proofs");
    }
    let request = args.into_request()?;
    let issued = TokenBuilder::new(keys).build(&request)?;
    display_issued_token(&issued);
    Ok(())
}

/// Show a token's structure, and its claims when keys are given
pub fn inspect(token: &str, keys: Option<&Path>) -> AppResult<()> {
    let parsed = QToken::parse(token, ED25519_SIGNATURE_LEN + ML_DSA_65_SIGNATURE_LEN)?;
    display_token_structure(&parsed, token.trim().len());

    if let Some(path) = keys {
        let keys = VerificationKeys::load(path)?;
        let plaintext = keys
            .cipher()
            .decrypt(&parsed.encrypted_payload, &parsed.header.encode())?;
        let payload = TokenPayload::from_cbor(&plaintext)?;
        println!("Claims (decrypted; signature and expiry not checked)");
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

/// Validate a token offline against an in-memory revocation list
pub async fn validate(
    token: &str,
    keys: &Path,
    issuer: String,
    audience: String,
    revoked: &[String],
) -> AppResult<()> {
    let keys = VerificationKeys::load(keys)?;
    let registry = RevocationRegistry::initialize(
        Arc::new(InMemoryRevocationStore::new()),
        RevocationSettings::default(),
    )
    .await?;
    for revocation_id in revoked {
        registry.revoke(revocation_id, "revoked on the command line").await?;
    }

    let validator = TokenValidator::new(
        ValidatorConfig::new(issuer, audience),
        keys,
        Arc::new(registry),
    );
    match validator.validate(token.trim()).await {
        Ok(validated) => {
            println!("Token accepted");
            println!("{}", serde_json::to_string_pretty(&validated.payload)?);
            Ok(())
        }
        Err(error) => {
            println!("Token rejected: {}", error.code);
            Err(error)
        }
    }
}
