// ABOUTME: Unified error taxonomy for token issuance, validation, proofs and policy loading
// ABOUTME: Stable error codes with HTTP status mapping and retryability classification
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! # Unified Error Handling
//!
//! Every failure in the protocol core is reported as an [`AppError`] carrying a stable
//! [`ErrorCode`]. The codes mirror the validation state machine so callers can tell
//! retryable conditions (clock skew near a boundary, an unreachable revocation service)
//! from terminal ones (revocation, signature failure).
//!
//! Messages are safe to log: they never contain key material, and signature failures
//! never say which of the two signatures failed.

#[cfg(feature = "http-response")]
mod http;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error codes used throughout the protocol
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    // Token validation taxonomy
    /// Header version byte is not a supported protocol version
    InvalidVersion,
    /// Header token-type byte is outside the known enumeration
    InvalidTokenType,
    /// Dual signature did not verify (or the key id is unknown)
    SignatureVerificationFailed,
    /// AEAD authentication failed or the plaintext is not a valid payload
    PayloadDecryptionFailed,
    /// Expiry is not in the future
    TokenExpired,
    /// Not-before (or header creation time) is in the future
    TokenNotYetValid,
    /// Expected audience is absent from the token
    AudienceMismatch,
    /// Token issuer differs from the expected issuer
    IssuerMismatch,
    /// Proof-of-possession does not match the token or the request
    ProofBindingMismatch,
    /// Token revocation id has been revoked
    TokenRevoked,

    // Transport / framing
    /// Token bytes cannot be decoded into the wire layout
    MalformedToken,
    /// No token was presented with the request
    MissingToken,
    /// Proof-of-possession required but absent
    ProofMissing,
    /// Proof-of-possession cannot be decoded
    MalformedProof,
    /// Proof timestamp is outside the acceptance window
    ProofStale,
    /// Proof nonce has already been used inside the window
    ProofReplayed,
    /// Proof signature does not verify under the embedded key
    ProofSignatureInvalid,

    // Policy
    /// Policy document failed validation or compilation
    PolicyInvalid,

    // Configuration
    /// Required input or configuration is missing or empty
    ConfigError,
    /// Configuration value cannot be parsed or is out of range
    ConfigInvalid,

    // Internal
    /// Serialization or deserialization failed
    SerializationError,
    /// An external collaborator (revocation service, policy store) is unavailable
    ExternalServiceUnavailable,
    /// Unexpected internal failure
    InternalError,
}

impl ErrorCode {
    /// Stable machine-readable code string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidVersion => "invalid-version",
            Self::InvalidTokenType => "invalid-token-type",
            Self::SignatureVerificationFailed => "signature-verification-failed",
            Self::PayloadDecryptionFailed => "payload-decryption-failed",
            Self::TokenExpired => "token-expired",
            Self::TokenNotYetValid => "token-not-yet-valid",
            Self::AudienceMismatch => "audience-mismatch",
            Self::IssuerMismatch => "issuer-mismatch",
            Self::ProofBindingMismatch => "proof-binding-mismatch",
            Self::TokenRevoked => "token-revoked",
            Self::MalformedToken => "malformed-token",
            Self::MissingToken => "missing-token",
            Self::ProofMissing => "proof-missing",
            Self::MalformedProof => "malformed-proof",
            Self::ProofStale => "proof-stale",
            Self::ProofReplayed => "proof-replayed",
            Self::ProofSignatureInvalid => "proof-signature-invalid",
            Self::PolicyInvalid => "policy-invalid",
            Self::ConfigError => "config-error",
            Self::ConfigInvalid => "config-invalid",
            Self::SerializationError => "serialization-error",
            Self::ExternalServiceUnavailable => "external-service-unavailable",
            Self::InternalError => "internal-error",
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::PolicyInvalid | Self::SerializationError => 400,

            // 401 Unauthorized
            Self::InvalidVersion
            | Self::InvalidTokenType
            | Self::SignatureVerificationFailed
            | Self::PayloadDecryptionFailed
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::AudienceMismatch
            | Self::IssuerMismatch
            | Self::ProofBindingMismatch
            | Self::TokenRevoked
            | Self::MalformedToken
            | Self::MissingToken
            | Self::ProofMissing
            | Self::MalformedProof
            | Self::ProofStale
            | Self::ProofReplayed
            | Self::ProofSignatureInvalid => 401,

            // 503 Service Unavailable
            Self::ExternalServiceUnavailable => 503,

            // 500 Internal Server Error
            Self::ConfigError | Self::ConfigInvalid | Self::InternalError => 500,
        }
    }

    /// Whether a client may reasonably retry after this failure
    ///
    /// Clock-related rejections can clear once clocks agree; availability failures can
    /// clear once the collaborator recovers. Everything else is terminal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TokenNotYetValid | Self::ProofStale | Self::ExternalServiceUnavailable
        )
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidVersion => "The token version is not supported",
            Self::InvalidTokenType => "The token type is not recognized",
            Self::SignatureVerificationFailed => "The token signature could not be verified",
            Self::PayloadDecryptionFailed => "The token payload could not be decrypted",
            Self::TokenExpired => "The token has expired",
            Self::TokenNotYetValid => "The token is not yet valid",
            Self::AudienceMismatch => "The token was not issued for this audience",
            Self::IssuerMismatch => "The token was not issued by the expected issuer",
            Self::ProofBindingMismatch => "The proof of possession does not match the token",
            Self::TokenRevoked => "The token has been revoked",
            Self::MalformedToken => "The token is malformed",
            Self::MissingToken => "No token was presented",
            Self::ProofMissing => "A proof of possession is required",
            Self::MalformedProof => "The proof of possession is malformed",
            Self::ProofStale => "The proof of possession is outside the acceptance window",
            Self::ProofReplayed => "The proof of possession has already been used",
            Self::ProofSignatureInvalid => "The proof of possession signature is invalid",
            Self::PolicyInvalid => "The policy document is invalid",
            Self::ConfigError => "Required configuration is missing",
            Self::ConfigInvalid => "Configuration is invalid",
            Self::SerializationError => "Data serialization/deserialization failed",
            Self::ExternalServiceUnavailable => "An external service is currently unavailable",
            Self::InternalError => "An internal error occurred",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the protocol core
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Create an error whose message is the code's stock description
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.description())
    }

    /// Token bytes cannot be decoded
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedToken, message)
    }

    /// Proof cannot be decoded
    pub fn malformed_proof(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedProof, message)
    }

    /// Generic signature failure; deliberately says nothing about which scheme failed
    #[must_use]
    pub fn signature_failed() -> Self {
        Self::from_code(ErrorCode::SignatureVerificationFailed)
    }

    /// Required input or configuration is missing
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Configuration value is invalid
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Policy document is invalid
    pub fn policy_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PolicyInvalid, message)
    }

    /// Serialization failure
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    /// External collaborator unavailable
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceUnavailable,
            format!("{}: {}", service.into(), message.into()),
        )
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<ErrorCode> for AppError {
    fn from(code: ErrorCode) -> Self {
        Self::from_code(code)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {error}")).with_source(error)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Wire format for error responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorResponseDetails,
}

/// Error details in a response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Stable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Whether retrying may succeed
    pub retryable: bool,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                // Responses carry the stock description, not the internal message
                message: error.code.description().to_owned(),
                retryable: error.code.is_retryable(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings_are_stable() {
        assert_eq!(ErrorCode::InvalidVersion.as_str(), "invalid-version");
        assert_eq!(ErrorCode::TokenRevoked.as_str(), "token-revoked");
        assert_eq!(
            ErrorCode::SignatureVerificationFailed.to_string(),
            "signature-verification-failed"
        );

        let json = serde_json::to_string(&ErrorCode::ProofBindingMismatch).unwrap();
        assert_eq!(json, "\"proof-binding-mismatch\"");
    }

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::TokenExpired.http_status(), 401);
        assert_eq!(ErrorCode::ProofMissing.http_status(), 401);
        assert_eq!(ErrorCode::ExternalServiceUnavailable.http_status(), 503);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ErrorCode::TokenNotYetValid.is_retryable());
        assert!(ErrorCode::ProofStale.is_retryable());
        assert!(!ErrorCode::TokenRevoked.is_retryable());
        assert!(!ErrorCode::SignatureVerificationFailed.is_retryable());
    }

    #[test]
    fn test_error_response_hides_internal_message() {
        let error = AppError::new(ErrorCode::IssuerMismatch, "expected https://a, got https://b");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("issuer-mismatch"));
        assert!(!json.contains("https://b"));
    }
}
