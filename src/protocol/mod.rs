// ABOUTME: Protocol facade for issuing servers and resource servers
// ABOUTME: Header parsing and the authorize / reject / deny boundary outcome
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Protocol facade
//!
//! Issuing servers hold [`IssuingServer`] (secret keys, builder, revocation). Resource
//! servers hold [`ResourceServer`] (verification keys only) and turn each request into
//! exactly one [`ProtocolOutcome`].

/// Issuing-server API
pub mod issuing;
/// Resource-server API
pub mod resource;

pub use issuing::IssuingServer;
pub use resource::{AuthorizationRequest, ResourceServer, ResourceTasks};

use crate::policy::Decision;
use crate::token::ValidatedToken;
use qtoken_core::constants::http::AUTH_SCHEME;
use qtoken_core::errors::{AppError, AppResult, ErrorCode};

/// Authenticated and authorized request
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    /// The validated token
    pub token: ValidatedToken,
    /// The allow decision
    pub decision: Decision,
}

impl AuthorizedRequest {
    /// Token subject
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.token.payload.sub
    }
}

/// Outcome at the protocol boundary
#[derive(Debug)]
pub enum ProtocolOutcome {
    /// Token and proof accepted, policy allows the action
    Authorized(Box<AuthorizedRequest>),
    /// Token or proof rejected
    Rejected(AppError),
    /// Policy denied the action
    Denied(Decision),
}

impl ProtocolOutcome {
    /// Whether the request may proceed
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized(_))
    }

    /// Rejection code, if rejected
    #[must_use]
    pub const fn rejection_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected(error) => Some(error.code),
            _ => None,
        }
    }
}

/// Extract the token from an `Authorization: QToken <token>` header value
///
/// # Errors
///
/// Returns `missing-token` when the header is absent, uses another scheme or is empty
pub fn parse_authorization(header: Option<&str>) -> AppResult<&str> {
    let header = header.ok_or_else(|| AppError::from_code(ErrorCode::MissingToken))?;
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| AppError::new(ErrorCode::MissingToken, "expected 'QToken <token>'"))?;
    if !scheme.eq_ignore_ascii_case(AUTH_SCHEME) {
        return Err(AppError::new(
            ErrorCode::MissingToken,
            "authorization scheme is not QToken",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::from_code(ErrorCode::MissingToken));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authorization() {
        assert_eq!(parse_authorization(Some("QToken abc")).unwrap(), "abc");
        assert_eq!(parse_authorization(Some("qtoken  abc ")).unwrap(), "abc");
        for header in [None, Some("Bearer abc"), Some("QToken"), Some("QToken   ")] {
            assert_eq!(
                parse_authorization(header).unwrap_err().code,
                ErrorCode::MissingToken,
                "{header:?}"
            );
        }
    }
}
