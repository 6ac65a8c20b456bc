// ABOUTME: Policy sources the store fetches published documents from
// ABOUTME: HTTP source with ETag revalidation and Cache-Control max-age, plus a static source
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Policy sources
//!
//! ```text
//! GET {base}/policies/{id}                     latest version
//! GET {base}/policies/{id}/versions/{version}  pinned version
//!   If-None-Match: <etag>  ->  304 Not Modified
//! ```

use super::document::PolicyDocument;
use crate::http_client;
use async_trait::async_trait;
use qtoken_core::errors::{AppError, AppResult};
use reqwest::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "policy-store";

/// Policy reference carried in the token `pol` claim
///
/// `urn:example:policy` follows the latest version; `urn:example:policy@3` pins one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyRef {
    /// Policy id
    pub id: String,
    /// Pinned version
    pub version: Option<u64>,
}

impl PolicyRef {
    /// Reference to the latest version
    pub fn latest(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
        }
    }

    /// Reference to one version
    pub fn pinned(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            version: Some(version),
        }
    }
}

impl FromStr for PolicyRef {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (id, version) = match s.rsplit_once('@') {
            Some((id, version)) => {
                let version = version.parse::<u64>().map_err(|_| {
                    AppError::policy_invalid(format!("invalid pinned version in '{s}'"))
                })?;
                (id, Some(version))
            }
            None => (s, None),
        };
        if id.is_empty() {
            return Err(AppError::policy_invalid("empty policy reference"));
        }
        Ok(Self {
            id: id.to_owned(),
            version,
        })
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => write!(f, "{}@{version}", self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// Result of a fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// New or changed document
    Modified {
        /// The document
        document: Box<PolicyDocument>,
        /// Validator for the next conditional fetch
        etag: Option<String>,
        /// Freshness lifetime announced by the source
        max_age: Option<Duration>,
    },
    /// The cached copy is still current
    NotModified {
        /// Freshness lifetime announced by the source
        max_age: Option<Duration>,
    },
    /// The source does not know the policy
    NotFound,
}

/// Where published policy documents come from
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Fetch a policy, revalidating against `etag` when given
    async fn fetch(&self, reference: &PolicyRef, etag: Option<&str>) -> AppResult<FetchOutcome>;
}

/// Parse `max-age` out of a Cache-Control value
#[must_use]
pub fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok().map(Duration::from_secs)
        } else {
            None
        }
    })
}

/// Policy store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpPolicySource {
    client: Client,
    base_url: String,
}

impl HttpPolicySource {
    /// Source at `base_url`
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: http_client::client_with_timeout(request_timeout),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn document_url(&self, reference: &PolicyRef) -> String {
        let id = urlencoding::encode(&reference.id);
        match reference.version {
            Some(version) => format!("{}/policies/{id}/versions/{version}", self.base_url),
            None => format!("{}/policies/{id}", self.base_url),
        }
    }
}

#[async_trait]
impl PolicySource for HttpPolicySource {
    async fn fetch(&self, reference: &PolicyRef, etag: Option<&str>) -> AppResult<FetchOutcome> {
        let mut request = self.client.get(self.document_url(reference));
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AppError::unavailable(SERVICE, format!("request failed: {e}")))?;

        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age);

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                debug!(policy.id = %reference, "Policy not modified");
                Ok(FetchOutcome::NotModified { max_age })
            }
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            status if status.is_success() => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let document = response.json::<PolicyDocument>().await.map_err(|e| {
                    AppError::policy_invalid(format!("invalid policy document from store: {e}"))
                })?;
                Ok(FetchOutcome::Modified {
                    document: Box::new(document),
                    etag,
                    max_age,
                })
            }
            status => Err(AppError::unavailable(
                SERVICE,
                format!("fetch returned HTTP {status}"),
            )),
        }
    }
}

/// In-process source holding published documents
#[derive(Debug, Default)]
pub struct StaticPolicySource {
    documents: RwLock<HashMap<String, BTreeMap<u64, PolicyDocument>>>,
}

impl StaticPolicySource {
    /// Empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a document; replaces any document with the same id and version
    pub fn publish(&self, document: PolicyDocument) {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        documents
            .entry(document.id.clone())
            .or_default()
            .insert(document.version, document);
    }

    fn etag(document: &PolicyDocument) -> String {
        format!("\"{}@{}\"", document.id, document.version)
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn fetch(&self, reference: &PolicyRef, etag: Option<&str>) -> AppResult<FetchOutcome> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(versions) = documents.get(&reference.id) else {
            return Ok(FetchOutcome::NotFound);
        };
        let document = match reference.version {
            Some(version) => versions.get(&version),
            None => versions.values().next_back(),
        };
        let Some(document) = document else {
            return Ok(FetchOutcome::NotFound);
        };

        let current = Self::etag(document);
        if etag == Some(current.as_str()) {
            return Ok(FetchOutcome::NotModified { max_age: None });
        }
        Ok(FetchOutcome::Modified {
            document: Box::new(document.clone()),
            etag: Some(current),
            max_age: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(version: u64) -> PolicyDocument {
        PolicyDocument {
            id: "urn:p".into(),
            version,
            issuer: "https://issuer.example".into(),
            rules: Vec::new(),
            default_effect: super::super::document::Effect::Deny,
        }
    }

    #[test]
    fn test_policy_ref_parsing() {
        let latest: PolicyRef = "urn:qtoken:policy:a".parse().unwrap();
        assert_eq!(latest, PolicyRef::latest("urn:qtoken:policy:a"));
        let pinned: PolicyRef = "urn:qtoken:policy:a@7".parse().unwrap();
        assert_eq!(pinned, PolicyRef::pinned("urn:qtoken:policy:a", 7));
        assert_eq!(pinned.to_string(), "urn:qtoken:policy:a@7");
        assert!("urn:a@latest".parse::<PolicyRef>().is_err());
        assert!("".parse::<PolicyRef>().is_err());
    }

    #[test]
    fn test_parse_max_age() {
        assert_eq!(
            parse_max_age("public, max-age=120"),
            Some(Duration::from_secs(120))
        );
        assert_eq!(parse_max_age("no-store"), None);
        assert_eq!(parse_max_age("max-age=abc"), None);
    }

    #[test]
    fn test_document_urls() {
        let source = HttpPolicySource::new("https://pol.example/", Duration::from_secs(1));
        assert_eq!(
            source.document_url(&PolicyRef::pinned("urn:a", 2)),
            "https://pol.example/policies/urn%3Aa/versions/2"
        );
    }

    #[tokio::test]
    async fn test_static_source_revalidates() {
        let source = StaticPolicySource::new();
        source.publish(document(1));
        source.publish(document(2));

        let reference = PolicyRef::latest("urn:p");
        let FetchOutcome::Modified { document, etag, .. } =
            source.fetch(&reference, None).await.unwrap()
        else {
            panic!("expected a document");
        };
        assert_eq!(document.version, 2);

        let outcome = source.fetch(&reference, etag.as_deref()).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NotModified { .. }));

        let missing = source.fetch(&PolicyRef::pinned("urn:p", 9), None).await.unwrap();
        assert_eq!(missing, FetchOutcome::NotFound);
    }
}
