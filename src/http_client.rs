// ABOUTME: Shared reqwest clients for the revocation service and policy store collaborators
// ABOUTME: Connection pooling with bounded connect and request timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// New client whose requests give up after `timeout`
///
/// Callers still wrap requests in their own `tokio::time::timeout`; the client limit only
/// stops a stuck connection from living forever.
#[must_use]
pub fn client_with_timeout(timeout: Duration) -> Client {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .user_agent(concat!("qtoken/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}
