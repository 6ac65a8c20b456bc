// ABOUTME: HTTP middleware for resource servers built on axum
// ABOUTME: Request guard enforcing the QToken authorization chain
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

/// Token, proof and policy guard
pub mod auth;

pub use auth::{
    action_for_method, require_qtoken, resource_for_path, ClientIp, QTokenState,
    DEFAULT_MAX_BODY_BYTES,
};
