// ABOUTME: Revocation store backed by a remote revocation service over HTTP
// ABOUTME: Point lookups, revocation writes and id listings via reqwest
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! HTTP revocation service client
//!
//! ```text
//! GET {base}/revocations/{id}   200 -> RevocationRecord, 404 -> not revoked
//! PUT {base}/revocations/{id}   body: RevocationRecord
//! GET {base}/revocations        200 -> ["id", ...]
//! ```

use super::store::{RevocationRecord, RevocationStore};
use crate::http_client;
use async_trait::async_trait;
use qtoken_core::errors::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "revocation-service";

/// Remote revocation service
#[derive(Debug, Clone)]
pub struct HttpRevocationService {
    client: Client,
    base_url: String,
}

impl HttpRevocationService {
    /// Client for the service at `base_url`
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: http_client::client_with_timeout(request_timeout),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn record_url(&self, revocation_id: &str) -> String {
        format!(
            "{}/revocations/{}",
            self.base_url,
            urlencoding::encode(revocation_id)
        )
    }
}

fn transport_error(error: &reqwest::Error) -> AppError {
    AppError::unavailable(SERVICE, format!("request failed: {error}"))
}

#[async_trait]
impl RevocationStore for HttpRevocationService {
    async fn revoke(&self, record: RevocationRecord) -> AppResult<()> {
        let response = self
            .client
            .put(self.record_url(&record.revocation_id))
            .json(&record)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::unavailable(
                SERVICE,
                format!("revoke returned HTTP {}", response.status()),
            ))
        }
    }

    async fn lookup(&self, revocation_id: &str) -> AppResult<Option<RevocationRecord>> {
        let response = self
            .client
            .get(self.record_url(revocation_id))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record = response
                    .json::<RevocationRecord>()
                    .await
                    .map_err(|e| AppError::unavailable(SERVICE, format!("invalid record: {e}")))?;
                debug!(revocation.id = %revocation_id, "Revocation service confirmed revoked id");
                Ok(Some(record))
            }
            status => Err(AppError::unavailable(
                SERVICE,
                format!("lookup returned HTTP {status}"),
            )),
        }
    }

    async fn list_revoked(&self) -> AppResult<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/revocations", self.base_url))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(AppError::unavailable(
                SERVICE,
                format!("listing returned HTTP {}", response.status()),
            ));
        }
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| AppError::unavailable(SERVICE, format!("invalid listing: {e}")))
    }
}
