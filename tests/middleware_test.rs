// ABOUTME: Integration tests for the axum guard
// ABOUTME: Drives a router through the middleware and checks status codes and bodies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

#![cfg(feature = "middleware")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Extension, Router};
use common::{issuer_keys, resource_server, token_request};
use qtoken::constants::http::PROOF_HEADER;
use qtoken::middleware::{require_qtoken, QTokenState};
use qtoken::proof::ProofSigner;
use qtoken::protocol::AuthorizedRequest;
use qtoken::token::TokenBuilder;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

async fn whoami(Extension(authorized): Extension<AuthorizedRequest>) -> String {
    authorized.subject().to_owned()
}

async fn router() -> Result<Router> {
    let (server, _) = resource_server().await?;
    let state = QTokenState::new(Arc::new(server)).with_max_body_bytes(64);
    Ok(Router::new()
        .route("/projects/:name", get(whoami).post(whoami))
        .route("/admin", post(whoami))
        .layer(from_fn_with_state(state, require_qtoken)))
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn signed_request(
    client: &ProofSigner,
    token: &str,
    method: &str,
    uri: &str,
    body: &'static [u8],
) -> Result<Request<Body>> {
    let body_for_proof = (!body.is_empty()).then_some(body);
    let proof = client.sign_request(method, uri, body_for_proof, token)?.encode()?;
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("QToken {token}"))
        .header(PROOF_HEADER, proof)
        .body(Body::from(body))?)
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() -> Result<()> {
    let response = router()
        .await?
        .oneshot(Request::builder().uri("/projects/apollo").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["error"]["code"], "missing-token");
    assert_eq!(body["error"]["retryable"], false);
    Ok(())
}

#[tokio::test]
async fn test_authorized_request_reaches_handler() -> Result<()> {
    let client = ProofSigner::generate();
    let token = TokenBuilder::new(issuer_keys())
        .build(&token_request(&client))?
        .token;
    let response = router()
        .await?
        .oneshot(signed_request(&client, &token, "GET", "/projects/apollo", b"")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&bytes[..], b"alice");
    Ok(())
}

#[tokio::test]
async fn test_policy_denial_is_forbidden() -> Result<()> {
    let client = ProofSigner::generate();
    let token = TokenBuilder::new(issuer_keys())
        .build(&token_request(&client))?
        .token;
    let response = router()
        .await?
        .oneshot(signed_request(&client, &token, "POST", "/admin", b"{\"x\":1}")?)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await?;
    assert_eq!(body["error"]["code"], "access-denied");
    assert_eq!(body["error"]["policy_id"], common::POLICY_ID);
    Ok(())
}

#[tokio::test]
async fn test_body_is_part_of_the_proof() -> Result<()> {
    let client = ProofSigner::generate();
    let token = TokenBuilder::new(issuer_keys())
        .build(&token_request(&client))?
        .token;
    let proof = client
        .sign_request("POST", "/projects/apollo", Some(b"original"), &token)?
        .encode()?;
    let request = Request::builder()
        .method("POST")
        .uri("/projects/apollo")
        .header(header::AUTHORIZATION, format!("QToken {token}"))
        .header(PROOF_HEADER, proof)
        .body(Body::from("tampered"))?;
    let response = router().await?.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await?["error"]["code"], "proof-binding-mismatch");
    Ok(())
}

#[tokio::test]
async fn test_oversized_body_is_refused() -> Result<()> {
    let client = ProofSigner::generate();
    let token = TokenBuilder::new(issuer_keys())
        .build(&token_request(&client))?
        .token;
    let big: &'static [u8] = &[b'x'; 128];
    let response = router()
        .await?
        .oneshot(signed_request(&client, &token, "POST", "/projects/apollo", big)?)
        .await?;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    Ok(())
}
