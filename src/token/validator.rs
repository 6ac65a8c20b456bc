// ABOUTME: Token validation state machine from wire string to accepted claims
// ABOUTME: Verifies both signatures, decrypts claims, checks time, audience, issuer and revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Token validation
//!
//! Validation is an explicit state machine:
//!
//! ```text
//! Received -> Parsed -> SignatureVerified -> Decrypted -> TemporalValid
//!          -> AudienceValid -> IssuerValid -> NotRevoked -> Accepted
//! ```
//!
//! Any failing transition moves to the terminal `Rejected` state carrying exactly one
//! error code.

use super::header::TokenHeader;
use super::payload::TokenPayload;
use super::wire::{token_hash, ProofBinding, QToken};
use crate::crypto::hash::constant_time_eq;
use crate::crypto::VerificationKeys;
use crate::logging::AppLogger;
use crate::revocation::RevocationRegistry;
use qtoken_core::constants::defaults::{CLAIM_LEEWAY_SECS, CLOCK_SKEW_SECS};
use qtoken_core::errors::{AppError, AppResult, ErrorCode};
use std::sync::Arc;

/// Validator settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Issuer the token's `iss` must equal
    pub expected_issuer: String,
    /// Audience that must appear in the token's `aud`
    pub expected_audience: String,
    /// Tolerated future drift of the header creation time, seconds
    pub clock_skew_secs: u64,
    /// Tolerance applied to `exp` and `nbf`, seconds
    pub claim_leeway_secs: u64,
}

impl ValidatorConfig {
    /// Config with default skew and leeway
    pub fn new(expected_issuer: impl Into<String>, expected_audience: impl Into<String>) -> Self {
        Self {
            expected_issuer: expected_issuer.into(),
            expected_audience: expected_audience.into(),
            clock_skew_secs: CLOCK_SKEW_SECS,
            claim_leeway_secs: CLAIM_LEEWAY_SECS,
        }
    }
}

/// Token that passed structural parsing
#[derive(Debug, Clone)]
pub struct ParsedToken {
    /// Decoded token sections
    pub token: QToken,
    /// SHA-256 hex of the transport form
    pub token_hash: String,
}

/// Token whose claims have been decrypted
#[derive(Debug, Clone)]
pub struct OpenedToken {
    /// Parsed token
    pub parsed: ParsedToken,
    /// Decrypted claims
    pub payload: TokenPayload,
}

/// Result of a successful validation
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    /// Token header
    pub header: TokenHeader,
    /// Verified claims
    pub payload: TokenPayload,
    /// Proof binding, authenticated through the payload context hash
    pub binding: ProofBinding,
    /// SHA-256 hex of the transport form, compared against proofs
    pub token_hash: String,
}

/// Validation states
#[derive(Debug)]
pub enum ValidationState {
    /// Raw transport string
    Received(String),
    /// Length and header checks passed
    Parsed(Box<ParsedToken>),
    /// Key id matched and both signatures verified
    SignatureVerified(Box<ParsedToken>),
    /// Claims decrypted and the binding authenticated
    Decrypted(Box<OpenedToken>),
    /// Creation, expiry and not-before checks passed
    TemporalValid(Box<OpenedToken>),
    /// Expected audience present
    AudienceValid(Box<OpenedToken>),
    /// Issuer matched
    IssuerValid(Box<OpenedToken>),
    /// Revocation registry consulted
    NotRevoked(Box<OpenedToken>),
    /// Terminal success
    Accepted(Box<ValidatedToken>),
    /// Terminal failure
    Rejected(AppError),
}

impl ValidationState {
    /// State name for logs
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Received(_) => "received",
            Self::Parsed(_) => "parsed",
            Self::SignatureVerified(_) => "signature_verified",
            Self::Decrypted(_) => "decrypted",
            Self::TemporalValid(_) => "temporal_valid",
            Self::AudienceValid(_) => "audience_valid",
            Self::IssuerValid(_) => "issuer_valid",
            Self::NotRevoked(_) => "not_revoked",
            Self::Accepted(_) => "accepted",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Validates tokens against one issuer's verification keys
#[derive(Clone)]
pub struct TokenValidator {
    config: ValidatorConfig,
    keys: VerificationKeys,
    revocation: Arc<RevocationRegistry>,
}

impl TokenValidator {
    /// Validator over the given keys and revocation registry
    #[must_use]
    pub const fn new(
        config: ValidatorConfig,
        keys: VerificationKeys,
        revocation: Arc<RevocationRegistry>,
    ) -> Self {
        Self {
            config,
            keys,
            revocation,
        }
    }

    /// Validator settings
    #[must_use]
    pub const fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Revocation registry consulted before acceptance
    #[must_use]
    pub const fn revocation(&self) -> &Arc<RevocationRegistry> {
        &self.revocation
    }

    /// Validate a token at the current time
    ///
    /// # Errors
    ///
    /// Returns the rejection code of the first failing check
    pub async fn validate(&self, encoded: &str) -> AppResult<ValidatedToken> {
        self.validate_at(encoded, super::unix_now_ms()).await
    }

    /// Validate a token as of `now_ms` milliseconds since the epoch
    ///
    /// # Errors
    ///
    /// Returns the rejection code of the first failing check
    pub async fn validate_at(&self, encoded: &str, now_ms: u64) -> AppResult<ValidatedToken> {
        let mut state = ValidationState::Received(encoded.to_owned());
        loop {
            let stage = state.stage();
            state = match state {
                ValidationState::Accepted(validated) => return Ok(*validated),
                ValidationState::Rejected(error) => return Err(error),
                ValidationState::IssuerValid(opened) => self.check_revocation(opened).await,
                other => self.advance(other, now_ms),
            };

            match &state {
                ValidationState::Rejected(error) => AppLogger::log_token_rejected(error.code, stage),
                ValidationState::Accepted(validated) => {
                    AppLogger::log_token_accepted(&validated.payload.jti);
                }
                _ => {}
            }
        }
    }

    /// Synchronous transitions
    fn advance(&self, state: ValidationState, now_ms: u64) -> ValidationState {
        let next = match state {
            ValidationState::Received(encoded) => self.parse(&encoded),
            ValidationState::Parsed(parsed) => self.verify_signature(parsed),
            ValidationState::SignatureVerified(parsed) => self.decrypt(*parsed),
            ValidationState::Decrypted(opened) => self.check_temporal(opened, now_ms),
            ValidationState::TemporalValid(opened) => self.check_audience(opened),
            ValidationState::AudienceValid(opened) => self.check_issuer(opened),
            ValidationState::NotRevoked(opened) => Ok(accept(*opened)),
            terminal @ (ValidationState::IssuerValid(_)
            | ValidationState::Accepted(_)
            | ValidationState::Rejected(_)) => Ok(terminal),
        };
        next.unwrap_or_else(ValidationState::Rejected)
    }

    fn parse(&self, encoded: &str) -> AppResult<ValidationState> {
        let token = QToken::parse(encoded, self.keys.verifier().signature_len())?;
        Ok(ValidationState::Parsed(Box::new(ParsedToken {
            token,
            token_hash: token_hash(encoded),
        })))
    }

    fn verify_signature(&self, parsed: Box<ParsedToken>) -> AppResult<ValidationState> {
        // Both halves are evaluated even when the key id is wrong; the error stays generic
        let key_matches = parsed.token.header.key_id == *self.keys.key_id();
        let signatures_valid = self
            .keys
            .verifier()
            .verify(&parsed.token.signed_message(), &parsed.token.signature);
        if key_matches & signatures_valid {
            Ok(ValidationState::SignatureVerified(parsed))
        } else {
            Err(AppError::signature_failed())
        }
    }

    fn decrypt(&self, parsed: ParsedToken) -> AppResult<ValidationState> {
        let header_bytes = parsed.token.header.encode();
        let plaintext = self
            .keys
            .cipher()
            .decrypt(&parsed.token.encrypted_payload, &header_bytes)?;
        let payload = TokenPayload::from_cbor(&plaintext)?;

        if !payload.is_well_formed() {
            return Err(AppError::malformed_token(
                "token claims violate exp/iat/nbf ordering",
            ));
        }

        let expected_ctx = hex::encode(parsed.token.binding.context_hash());
        if !constant_time_eq(expected_ctx.as_bytes(), payload.ctx.as_bytes()) {
            return Err(AppError::new(
                ErrorCode::ProofBindingMismatch,
                "proof binding does not match the signed context",
            ));
        }

        Ok(ValidationState::Decrypted(Box::new(OpenedToken {
            parsed,
            payload,
        })))
    }

    fn check_temporal(&self, opened: Box<OpenedToken>, now_ms: u64) -> AppResult<ValidationState> {
        let skew_ms = self.config.clock_skew_secs.saturating_mul(1000);
        if opened.parsed.token.header.created_at_ms > now_ms.saturating_add(skew_ms) {
            return Err(AppError::new(
                ErrorCode::TokenNotYetValid,
                "token creation time is in the future",
            ));
        }

        let now = now_ms / 1000;
        let leeway = self.config.claim_leeway_secs;
        if opened.payload.exp.saturating_add(leeway) <= now {
            return Err(AppError::new(ErrorCode::TokenExpired, "token has expired"));
        }
        if opened.payload.nbf > now.saturating_add(leeway) {
            return Err(AppError::new(
                ErrorCode::TokenNotYetValid,
                "token is not valid yet",
            ));
        }
        Ok(ValidationState::TemporalValid(opened))
    }

    fn check_audience(&self, opened: Box<OpenedToken>) -> AppResult<ValidationState> {
        if opened.payload.has_audience(&self.config.expected_audience) {
            Ok(ValidationState::AudienceValid(opened))
        } else {
            Err(AppError::new(
                ErrorCode::AudienceMismatch,
                "token is not intended for this audience",
            ))
        }
    }

    fn check_issuer(&self, opened: Box<OpenedToken>) -> AppResult<ValidationState> {
        if opened.payload.iss == self.config.expected_issuer {
            Ok(ValidationState::IssuerValid(opened))
        } else {
            Err(AppError::new(
                ErrorCode::IssuerMismatch,
                "token was issued by an unexpected issuer",
            ))
        }
    }

    async fn check_revocation(&self, opened: Box<OpenedToken>) -> ValidationState {
        match self.revocation.is_revoked(&opened.payload.rid).await {
            Ok(false) => ValidationState::NotRevoked(opened),
            Ok(true) => ValidationState::Rejected(AppError::new(
                ErrorCode::TokenRevoked,
                "token has been revoked",
            )),
            Err(error) => ValidationState::Rejected(error),
        }
    }
}

fn accept(opened: OpenedToken) -> ValidationState {
    let OpenedToken { parsed, payload } = opened;
    ValidationState::Accepted(Box::new(ValidatedToken {
        header: parsed.token.header,
        binding: parsed.token.binding,
        token_hash: parsed.token_hash,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::IssuerKeys;
    use crate::revocation::InMemoryRevocationStore;
    use crate::token::builder::{TokenBuilder, TokenRequest};
    use std::sync::OnceLock;

    const NOW_MS: u64 = 1_700_000_000_000;

    fn keys() -> Arc<IssuerKeys> {
        static KEYS: OnceLock<Arc<IssuerKeys>> = OnceLock::new();
        KEYS.get_or_init(|| Arc::new(IssuerKeys::generate())).clone()
    }

    async fn validator() -> TokenValidator {
        let registry = RevocationRegistry::initialize(
            Arc::new(InMemoryRevocationStore::new()),
            crate::revocation::RevocationSettings::default(),
        )
        .await
        .unwrap();
        TokenValidator::new(
            ValidatorConfig::new("https://issuer.example", "api"),
            keys().verification_keys(),
            Arc::new(registry),
        )
    }

    fn issue(validity: u64) -> String {
        let request = TokenRequest::new(
            "user-1",
            "https://issuer.example",
            vec!["api".into()],
            "urn:qtoken:policy:default",
        )
        .with_validity(validity);
        TokenBuilder::new(keys())
            .build_at(&request, NOW_MS)
            .unwrap()
            .token
    }

    #[tokio::test]
    async fn test_accepts_fresh_token() {
        let validator = validator().await;
        let validated = validator.validate_at(&issue(60), NOW_MS).await.unwrap();
        assert_eq!(validated.payload.sub, "user-1");
        assert_eq!(validated.payload.exp, validated.payload.iat + 60);
    }

    #[tokio::test]
    async fn test_future_header_outside_skew() {
        let validator = validator().await;
        let token = issue(3600);
        let early = NOW_MS - 301_000;
        let error = validator.validate_at(&token, early).await.unwrap_err();
        assert_eq!(error.code, ErrorCode::TokenNotYetValid);

        // Inside the skew the header passes but nbf (== iat) is still ahead
        let slightly_early = NOW_MS - 10_000;
        let error = validator
            .validate_at(&token, slightly_early)
            .await
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::TokenNotYetValid);
    }

    #[tokio::test]
    async fn test_wrong_key_set_is_generic_signature_failure() {
        let other = IssuerKeys::generate();
        let registry = RevocationRegistry::initialize(
            Arc::new(InMemoryRevocationStore::new()),
            crate::revocation::RevocationSettings::default(),
        )
        .await
        .unwrap();
        let validator = TokenValidator::new(
            ValidatorConfig::new("https://issuer.example", "api"),
            other.verification_keys(),
            Arc::new(registry),
        );
        let error = validator.validate_at(&issue(60), NOW_MS).await.unwrap_err();
        assert_eq!(error.code, ErrorCode::SignatureVerificationFailed);
        assert!(!error.message.to_lowercase().contains("ml-dsa"));
        assert!(!error.message.to_lowercase().contains("ed25519"));
    }

    #[test]
    fn test_stage_names() {
        let state = ValidationState::Received(String::new());
        assert_eq!(state.stage(), "received");
        let rejected = ValidationState::Rejected(AppError::from_code(ErrorCode::TokenExpired));
        assert_eq!(rejected.stage(), "rejected");
    }
}
