// ABOUTME: Axum middleware enforcing token, proof of possession and policy on a router
// ABOUTME: Maps path to resource and method to action, answers 401/403 JSON errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! QToken request guard
//!
//! ```rust,no_run
//! use axum::{middleware, routing::get, Extension, Router};
//! use qtoken::middleware::{require_qtoken, QTokenState};
//! use qtoken::protocol::{AuthorizedRequest, ResourceServer};
//! use std::sync::Arc;
//!
//! async fn handler(Extension(auth): Extension<AuthorizedRequest>) -> String {
//!     format!("hello {}", auth.subject())
//! }
//!
//! fn router(server: Arc<ResourceServer>) -> Router {
//!     Router::new()
//!         .route("/projects/:id", get(handler))
//!         .layer(middleware::from_fn_with_state(QTokenState::new(server), require_qtoken))
//! }
//! ```

use crate::policy::Decision;
use crate::protocol::{AuthorizationRequest, ProtocolOutcome, ResourceServer};
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use qtoken_core::constants::http::{DEVICE_KEY_HEADER, PROOF_HEADER};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::warn;

/// Largest request body the guard buffers for body hashing
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Peer address set by a proxy-aware layer; takes precedence over `ConnectInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Middleware state
#[derive(Debug, Clone)]
pub struct QTokenState {
    server: Arc<ResourceServer>,
    max_body_bytes: usize,
}

impl QTokenState {
    /// State guarding requests with `server`
    #[must_use]
    pub const fn new(server: Arc<ResourceServer>) -> Self {
        Self {
            server,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Override the body size limit
    #[must_use]
    pub const fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

/// Policy action for an HTTP method
#[must_use]
pub fn action_for_method(method: &Method) -> String {
    match *method {
        Method::GET | Method::HEAD => "read".to_owned(),
        Method::POST => "create".to_owned(),
        Method::PUT | Method::PATCH => "update".to_owned(),
        Method::DELETE => "delete".to_owned(),
        _ => method.as_str().to_ascii_lowercase(),
    }
}

/// Policy resource for a request path
#[must_use]
pub fn resource_for_path(path: &str) -> &str {
    path.trim_matches('/')
}

#[derive(Debug, Serialize)]
struct DeniedBody<'a> {
    error: DeniedDetails<'a>,
}

#[derive(Debug, Serialize)]
struct DeniedDetails<'a> {
    code: &'static str,
    message: &'a str,
    policy_id: &'a str,
    matched_rule_id: Option<&'a str>,
}

fn denied_response(decision: &Decision) -> Response {
    let body = DeniedBody {
        error: DeniedDetails {
            code: "access-denied",
            message: &decision.reason,
            policy_id: &decision.policy_id,
            matched_rule_id: decision.matched_rule_id.as_deref(),
        },
    };
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Guard a router with the full token, proof and policy chain
///
/// Authorized requests continue with an [`AuthorizedRequest`](crate::protocol::AuthorizedRequest)
/// extension; rejections answer 401 (503 when a collaborator is down) and denials 403.
pub async fn require_qtoken(
    State(state): State<QTokenState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, state.max_body_bytes).await else {
        warn!(limit = state.max_body_bytes, "Request body over limit");
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    };

    let client_ip = parts
        .extensions
        .get::<ClientIp>()
        .map(|ip| ip.0)
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        });
    let uri = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
    let action = action_for_method(&parts.method);

    let mut auth_request = AuthorizationRequest::new(
        parts.method.as_str(),
        uri,
        resource_for_path(parts.uri.path()),
        &action,
    );
    auth_request.authorization = header(&parts.headers, axum::http::header::AUTHORIZATION.as_str());
    auth_request.proof = header(&parts.headers, PROOF_HEADER);
    auth_request.device_key = header(&parts.headers, DEVICE_KEY_HEADER);
    auth_request.client_ip = client_ip;
    if !bytes.is_empty() {
        auth_request.body = Some(&bytes);
    }

    let outcome = state.server.authorize(&auth_request).await;
    drop(auth_request);

    match outcome {
        ProtocolOutcome::Authorized(authorized) => {
            parts.extensions.insert(*authorized);
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        ProtocolOutcome::Rejected(error) => error.into_response(),
        ProtocolOutcome::Denied(decision) => denied_response(&decision),
    }
}
