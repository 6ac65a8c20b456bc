// ABOUTME: Versioned policy store with swap-only publication and source-backed resolution
// ABOUTME: Immutable (id, version) documents, ETag revalidation and stale-copy fallback
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::compiled::CompiledPolicy;
use super::document::PolicyDocument;
use super::source::{FetchOutcome, PolicyRef, PolicySource};
use crate::logging::AppLogger;
use dashmap::DashMap;
use qtoken_core::constants::defaults::{POLICY_FETCH_TIMEOUT_MS, POLICY_MAX_AGE_SECS};
use qtoken_core::errors::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const SERVICE: &str = "policy-store";

/// Store tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyStoreSettings {
    /// Bound on each source fetch
    pub fetch_timeout: Duration,
    /// Freshness lifetime when the source gives none
    pub default_max_age: Duration,
}

impl Default for PolicyStoreSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(POLICY_FETCH_TIMEOUT_MS),
            default_max_age: Duration::from_secs(POLICY_MAX_AGE_SECS),
        }
    }
}

/// Immutable set of compiled policies, replaced wholesale on publication
#[derive(Debug, Default, Clone)]
pub struct PolicySet {
    policies: HashMap<String, BTreeMap<u64, Arc<CompiledPolicy>>>,
}

impl PolicySet {
    /// Exact version
    #[must_use]
    pub fn get(&self, id: &str, version: u64) -> Option<&Arc<CompiledPolicy>> {
        self.policies.get(id)?.get(&version)
    }

    /// Highest version
    #[must_use]
    pub fn latest(&self, id: &str) -> Option<&Arc<CompiledPolicy>> {
        self.policies.get(id)?.values().next_back()
    }

    /// Resolve a reference against the set
    #[must_use]
    pub fn lookup(&self, reference: &PolicyRef) -> Option<&Arc<CompiledPolicy>> {
        match reference.version {
            Some(version) => self.get(&reference.id, version),
            None => self.latest(&reference.id),
        }
    }

    /// Known versions of a policy, ascending
    #[must_use]
    pub fn versions(&self, id: &str) -> Vec<u64> {
        self.policies
            .get(id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of policy ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the set holds no policy
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[derive(Debug, Clone)]
struct FetchState {
    etag: Option<String>,
    fresh_until: Instant,
}

/// Policy store
pub struct PolicyStore {
    set: RwLock<Arc<PolicySet>>,
    source: Option<Arc<dyn PolicySource>>,
    settings: PolicyStoreSettings,
    fetches: DashMap<String, FetchState>,
}

impl PolicyStore {
    /// Store holding only locally loaded policies
    #[must_use]
    pub fn new() -> Self {
        Self {
            set: RwLock::new(Arc::new(PolicySet::default())),
            source: None,
            settings: PolicyStoreSettings::default(),
            fetches: DashMap::new(),
        }
    }

    /// Store that resolves references through `source`
    pub fn with_source(source: Arc<dyn PolicySource>, settings: PolicyStoreSettings) -> Self {
        Self {
            source: Some(source),
            settings,
            ..Self::new()
        }
    }

    /// Store settings
    #[must_use]
    pub const fn settings(&self) -> &PolicyStoreSettings {
        &self.settings
    }

    /// Current policy set
    pub async fn snapshot(&self) -> Arc<PolicySet> {
        self.set.read().await.clone()
    }

    /// Validate, compile and publish a document
    ///
    /// Publishing an identical document again is a no-op. A document reusing an existing
    /// `(id, version)` with different content is rejected.
    ///
    /// # Errors
    ///
    /// Returns `policy-invalid` if the document does not compile or conflicts with a
    /// published version
    pub async fn load_policy(&self, document: PolicyDocument) -> AppResult<Arc<CompiledPolicy>> {
        let compiled = Arc::new(CompiledPolicy::compile(document)?);

        let mut slot = self.set.write().await;
        if let Some(existing) = slot.get(compiled.id(), compiled.version()) {
            if existing.digest() == compiled.digest() {
                return Ok(existing.clone());
            }
            return Err(AppError::policy_invalid(format!(
                "policy '{}' version {} is already published with different content",
                compiled.id(),
                compiled.version()
            )));
        }

        let mut next = PolicySet::clone(&slot);
        next.policies
            .entry(compiled.id().to_owned())
            .or_default()
            .insert(compiled.version(), compiled.clone());
        *slot = Arc::new(next);
        drop(slot);

        info!(
            policy.id = %compiled.id(),
            policy.version = compiled.version(),
            rules = compiled.rules().len(),
            "Policy published"
        );
        Ok(compiled)
    }

    /// Resolve a reference, refreshing stale entries from the source
    ///
    /// Pinned versions never change once cached. Unpinned references are revalidated
    /// after their max-age; a failed or slow fetch falls back to the cached copy.
    ///
    /// # Errors
    ///
    /// Returns `external-service-unavailable` when the source fails and nothing is cached
    pub async fn resolve(&self, reference: &PolicyRef) -> AppResult<Option<Arc<CompiledPolicy>>> {
        let cached = self.snapshot().await.lookup(reference).cloned();
        let Some(source) = &self.source else {
            return Ok(cached);
        };

        let key = reference.to_string();
        let state = self.fetches.get(&key).map(|entry| entry.value().clone());
        let etag = if cached.is_some() {
            let fresh = state
                .as_ref()
                .is_some_and(|state| state.fresh_until > Instant::now());
            if reference.version.is_some() || fresh {
                return Ok(cached);
            }
            state.and_then(|state| state.etag)
        } else {
            None
        };

        let fetched =
            tokio::time::timeout(self.settings.fetch_timeout, source.fetch(reference, etag.as_deref()))
                .await
                .unwrap_or_else(|_| {
                    Err(AppError::unavailable(
                        SERVICE,
                        format!("fetch timed out after {:?}", self.settings.fetch_timeout),
                    ))
                });

        match self.apply_fetch(reference, &key, fetched, etag).await {
            Ok(()) => Ok(self.snapshot().await.lookup(reference).cloned()),
            Err(error) => {
                AppLogger::log_dependency_failure(SERVICE, &error.message);
                match cached {
                    Some(policy) => {
                        warn!(
                            policy.id = %reference,
                            policy.version = policy.version(),
                            "Serving stale policy after failed refresh"
                        );
                        Ok(Some(policy))
                    }
                    None => Err(error),
                }
            }
        }
    }

    async fn apply_fetch(
        &self,
        reference: &PolicyRef,
        key: &str,
        fetched: AppResult<FetchOutcome>,
        previous_etag: Option<String>,
    ) -> AppResult<()> {
        match fetched? {
            FetchOutcome::Modified {
                document,
                etag,
                max_age,
            } => {
                if document.id != reference.id
                    || reference.version.is_some_and(|v| v != document.version)
                {
                    return Err(AppError::policy_invalid(format!(
                        "source answered '{reference}' with '{}@{}'",
                        document.id, document.version
                    )));
                }
                self.load_policy(*document).await?;
                self.mark_fresh(key, etag, max_age);
            }
            FetchOutcome::NotModified { max_age } => {
                debug!(policy.id = %reference, "Cached policy revalidated");
                self.mark_fresh(key, previous_etag, max_age);
            }
            FetchOutcome::NotFound => {
                debug!(policy.id = %reference, "Policy source does not know policy");
            }
        }
        Ok(())
    }

    fn mark_fresh(&self, key: &str, etag: Option<String>, max_age: Option<Duration>) {
        let lifetime = max_age.unwrap_or(self.settings.default_max_age);
        self.fetches.insert(
            key.to_owned(),
            FetchState {
                etag,
                fresh_until: Instant::now() + lifetime,
            },
        );
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("has_source", &self.source.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::document::{Effect, PolicyRule};
    use crate::policy::source::StaticPolicySource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn document(version: u64, effect: Effect) -> PolicyDocument {
        PolicyDocument {
            id: "urn:qtoken:policy:docs".into(),
            version,
            issuer: "https://issuer.example".into(),
            rules: vec![PolicyRule {
                id: "docs".into(),
                effect,
                resources: vec!["docs/**".into()],
                actions: vec!["read".into()],
                conditions: Vec::new(),
                priority: 0,
            }],
            default_effect: Effect::Deny,
        }
    }

    struct FlakySource {
        inner: StaticPolicySource,
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PolicySource for FlakySource {
        async fn fetch(&self, reference: &PolicyRef, etag: Option<&str>) -> AppResult<FetchOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::unavailable(SERVICE, "connection refused"));
            }
            self.inner.fetch(reference, etag).await
        }
    }

    #[tokio::test]
    async fn test_republish_is_idempotent_but_conflicts_fail() {
        let store = PolicyStore::new();
        store.load_policy(document(1, Effect::Allow)).await.unwrap();
        store.load_policy(document(1, Effect::Allow)).await.unwrap();
        let error = store.load_policy(document(1, Effect::Deny)).await.unwrap_err();
        assert_eq!(error.code, qtoken_core::errors::ErrorCode::PolicyInvalid);

        store.load_policy(document(2, Effect::Deny)).await.unwrap();
        let set = store.snapshot().await;
        assert_eq!(set.versions("urn:qtoken:policy:docs"), vec![1, 2]);
        assert_eq!(set.latest("urn:qtoken:policy:docs").unwrap().version(), 2);
    }

    #[tokio::test]
    async fn test_pinned_and_latest_resolution() {
        let store = PolicyStore::new();
        store.load_policy(document(1, Effect::Allow)).await.unwrap();
        store.load_policy(document(3, Effect::Deny)).await.unwrap();

        let pinned = store
            .resolve(&"urn:qtoken:policy:docs@1".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pinned.version(), 1);
        let latest = store
            .resolve(&PolicyRef::latest("urn:qtoken:policy:docs"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version(), 3);
        assert!(store
            .resolve(&PolicyRef::latest("urn:missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_copy_served_when_source_fails() {
        let source = Arc::new(FlakySource {
            inner: StaticPolicySource::new(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        source.inner.publish(document(1, Effect::Allow));
        let settings = PolicyStoreSettings {
            fetch_timeout: Duration::from_millis(200),
            default_max_age: Duration::ZERO,
        };
        let store = PolicyStore::with_source(source.clone(), settings);
        let reference = PolicyRef::latest("urn:qtoken:policy:docs");

        let first = store.resolve(&reference).await.unwrap().unwrap();
        assert_eq!(first.version(), 1);

        source.failing.store(true, Ordering::SeqCst);
        let stale = store.resolve(&reference).await.unwrap().unwrap();
        assert_eq!(stale.version(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        let error = store
            .resolve(&PolicyRef::latest("urn:never-fetched"))
            .await
            .unwrap_err();
        assert_eq!(
            error.code,
            qtoken_core::errors::ErrorCode::ExternalServiceUnavailable
        );
    }

    #[tokio::test]
    async fn test_fresh_entries_skip_the_source() {
        let source = Arc::new(FlakySource {
            inner: StaticPolicySource::new(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        source.inner.publish(document(1, Effect::Allow));
        let store = PolicyStore::with_source(source.clone(), PolicyStoreSettings::default());
        let reference = PolicyRef::latest("urn:qtoken:policy:docs");

        store.resolve(&reference).await.unwrap();
        store.resolve(&reference).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_version_picked_up_after_expiry() {
        let source = Arc::new(StaticPolicySource::new());
        source.publish(document(1, Effect::Allow));
        let settings = PolicyStoreSettings {
            fetch_timeout: Duration::from_millis(200),
            default_max_age: Duration::ZERO,
        };
        let store = PolicyStore::with_source(source.clone(), settings);
        let reference = PolicyRef::latest("urn:qtoken:policy:docs");
        assert_eq!(store.resolve(&reference).await.unwrap().unwrap().version(), 1);

        source.publish(document(2, Effect::Deny));
        assert_eq!(store.resolve(&reference).await.unwrap().unwrap().version(), 2);
        // The older version stays resolvable by pin
        let pinned = store
            .resolve(&PolicyRef::pinned("urn:qtoken:policy:docs", 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pinned.version(), 1);
    }
}
