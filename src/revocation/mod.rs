// ABOUTME: Revocation registry with a bloom-filter snapshot and authoritative store fallback
// ABOUTME: Copy-on-write snapshot swaps, bounded lookups and a background refresh task
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Revocation registry
//!
//! A bloom-filter snapshot answers most lookups locally. A negative answer is final; a
//! positive answer (or a strong-consistency request) goes to the authoritative
//! [`RevocationStore`] with a bounded timeout. The snapshot may lag the store by up to
//! one refresh interval for ids revoked elsewhere; ids revoked through this registry are
//! visible immediately. Local revokes and refreshes are serialized, so a refresh that
//! listed the store before a revoke cannot swap that revoke back out.

/// Bloom filter
pub mod bloom;
/// HTTP revocation service client
pub mod http;
/// Store trait and in-memory store
pub mod store;

pub use bloom::BloomFilter;
pub use http::HttpRevocationService;
pub use store::{InMemoryRevocationStore, RevocationRecord, RevocationStore};

use crate::logging::AppLogger;
use crate::tasks::{self, BackgroundTask};
use chrono::{DateTime, Utc};
use qtoken_core::constants::defaults::{
    BLOOM_EXPECTED_ITEMS, BLOOM_FALSE_POSITIVE_RATE, REVOCATION_REFRESH_SECS,
    REVOCATION_TIMEOUT_MS,
};
use qtoken_core::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const SERVICE: &str = "revocation-store";

/// Behaviour when the authoritative store cannot answer in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationFailureMode {
    /// Reject the token with `external-service-unavailable`
    #[default]
    FailClosed,
    /// Treat the token as not revoked and log a warning
    FailOpen,
}

impl fmt::Display for RevocationFailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailClosed => f.write_str("fail-closed"),
            Self::FailOpen => f.write_str("fail-open"),
        }
    }
}

impl FromStr for RevocationFailureMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            "fail-open" | "open" => Ok(Self::FailOpen),
            other => Err(AppError::config_invalid(format!(
                "unknown revocation failure mode '{other}'"
            ))),
        }
    }
}

/// Registry tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RevocationSettings {
    /// Interval between snapshot rebuilds
    pub refresh_interval: Duration,
    /// Bound on each authoritative store call
    pub lookup_timeout: Duration,
    /// Behaviour on store timeout or failure
    pub failure_mode: RevocationFailureMode,
    /// Items the bloom filter is sized for
    pub expected_items: usize,
    /// Target bloom false-positive rate
    pub false_positive_rate: f64,
}

impl Default for RevocationSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(REVOCATION_REFRESH_SECS),
            lookup_timeout: Duration::from_millis(REVOCATION_TIMEOUT_MS),
            failure_mode: RevocationFailureMode::default(),
            expected_items: BLOOM_EXPECTED_ITEMS,
            false_positive_rate: BLOOM_FALSE_POSITIVE_RATE,
        }
    }
}

/// Immutable view of the revoked set
#[derive(Debug, Clone)]
pub struct RevocationSnapshot {
    filter: BloomFilter,
    built_at: DateTime<Utc>,
}

impl RevocationSnapshot {
    fn build(ids: &[String], settings: &RevocationSettings) -> Self {
        let mut filter = BloomFilter::with_rate(
            settings.expected_items.max(ids.len()),
            settings.false_positive_rate,
        );
        for id in ids {
            filter.insert(id);
        }
        Self {
            filter,
            built_at: Utc::now(),
        }
    }

    /// Whether the id may be revoked
    #[must_use]
    pub fn might_contain(&self, revocation_id: &str) -> bool {
        self.filter.might_contain(revocation_id)
    }

    /// Number of ids in the snapshot
    #[must_use]
    pub const fn len(&self) -> usize {
        self.filter.len()
    }

    /// Whether the snapshot is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }

    /// When the snapshot was built
    #[must_use]
    pub const fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Revocation registry shared by validators
pub struct RevocationRegistry {
    store: Arc<dyn RevocationStore>,
    settings: RevocationSettings,
    snapshot: RwLock<Arc<RevocationSnapshot>>,
    update_lock: Mutex<()>,
}

impl RevocationRegistry {
    /// Create the registry and populate the first snapshot before returning
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot list revoked ids within the lookup timeout
    pub async fn initialize(
        store: Arc<dyn RevocationStore>,
        settings: RevocationSettings,
    ) -> AppResult<Self> {
        let empty = RevocationSnapshot::build(&[], &settings);
        let registry = Self {
            store,
            settings,
            snapshot: RwLock::new(Arc::new(empty)),
            update_lock: Mutex::new(()),
        };
        let count = registry.refresh().await?;
        info!(revoked = count, "Revocation registry initialized");
        Ok(registry)
    }

    /// Registry settings
    #[must_use]
    pub const fn settings(&self) -> &RevocationSettings {
        &self.settings
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<RevocationSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Revoke a token by revocation id
    ///
    /// The authoritative store is written first; the local snapshot is then replaced
    /// with one that includes the id.
    ///
    /// # Errors
    ///
    /// Returns `config-error` for an empty id, or `external-service-unavailable` if the
    /// store does not accept the write in time
    pub async fn revoke(&self, revocation_id: &str, reason: &str) -> AppResult<RevocationRecord> {
        let revocation_id = revocation_id.trim();
        if revocation_id.is_empty() {
            return Err(AppError::config("revocation id must not be empty"));
        }
        let record = RevocationRecord::new(revocation_id, reason);
        let _update = self.update_lock.lock().await;
        self.bounded(self.store.revoke(record.clone())).await?;

        let mut slot = self.snapshot.write().await;
        let mut next = RevocationSnapshot::clone(&slot);
        next.filter.insert(revocation_id);
        *slot = Arc::new(next);
        drop(slot);

        AppLogger::log_revocation(revocation_id, reason);
        Ok(record)
    }

    /// Whether a revocation id is revoked, using the bloom fast path
    ///
    /// # Errors
    ///
    /// Returns `external-service-unavailable` when a confirming lookup fails and the
    /// registry is fail-closed
    pub async fn is_revoked(&self, revocation_id: &str) -> AppResult<bool> {
        if !self.snapshot().await.might_contain(revocation_id) {
            return Ok(false);
        }
        self.authoritative_lookup(revocation_id).await
    }

    /// Whether a revocation id is revoked, always asking the authoritative store
    ///
    /// # Errors
    ///
    /// Returns `external-service-unavailable` when the lookup fails and the registry is
    /// fail-closed
    pub async fn is_revoked_strong(&self, revocation_id: &str) -> AppResult<bool> {
        self.authoritative_lookup(revocation_id).await
    }

    /// Rebuild the snapshot from the store and swap it in
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot list revoked ids in time; the previous
    /// snapshot stays in place
    pub async fn refresh(&self) -> AppResult<usize> {
        let _update = self.update_lock.lock().await;
        let ids = self.bounded(self.store.list_revoked()).await?;
        let next = Arc::new(RevocationSnapshot::build(&ids, &self.settings));
        *self.snapshot.write().await = next;
        debug!(revoked = ids.len(), "Revocation snapshot refreshed");
        Ok(ids.len())
    }

    /// Start periodic snapshot refresh
    ///
    /// Refresh failures keep the previous snapshot and are logged.
    #[must_use]
    pub fn spawn_refresh_task(self: &Arc<Self>) -> BackgroundTask {
        let registry = Arc::clone(self);
        tasks::spawn_periodic(
            "revocation-refresh",
            self.settings.refresh_interval,
            move || {
                let registry = registry.clone();
                async move {
                    if let Err(e) = registry.refresh().await {
                        AppLogger::log_dependency_failure(SERVICE, &e.message);
                    }
                }
            },
        )
    }

    async fn authoritative_lookup(&self, revocation_id: &str) -> AppResult<bool> {
        match self.bounded(self.store.lookup(revocation_id)).await {
            Ok(record) => Ok(record.is_some()),
            Err(error) => match self.settings.failure_mode {
                RevocationFailureMode::FailClosed => {
                    AppLogger::log_dependency_failure(SERVICE, &error.message);
                    Err(error)
                }
                RevocationFailureMode::FailOpen => {
                    warn!(
                        revocation.id = %revocation_id,
                        "Revocation lookup failed; treating token as not revoked (fail-open)"
                    );
                    Ok(false)
                }
            },
        }
    }

    async fn bounded<T>(
        &self,
        operation: impl std::future::Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        tokio::time::timeout(self.settings.lookup_timeout, operation)
            .await
            .map_err(|_| {
                AppError::unavailable(
                    SERVICE,
                    format!(
                        "no answer within {} ms",
                        self.settings.lookup_timeout.as_millis()
                    ),
                )
            })?
    }
}

impl fmt::Debug for RevocationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevocationRegistry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SlowStore;

    #[async_trait]
    impl RevocationStore for SlowStore {
        async fn revoke(&self, _record: RevocationRecord) -> AppResult<()> {
            Ok(())
        }

        async fn lookup(&self, _revocation_id: &str) -> AppResult<Option<RevocationRecord>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn list_revoked(&self) -> AppResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn fast_settings(failure_mode: RevocationFailureMode) -> RevocationSettings {
        RevocationSettings {
            lookup_timeout: Duration::from_millis(20),
            failure_mode,
            expected_items: 100,
            ..RevocationSettings::default()
        }
    }

    /// Lists slowly and never reflects writes, like a replica that lags the primary
    struct LaggingListStore;

    #[async_trait]
    impl RevocationStore for LaggingListStore {
        async fn revoke(&self, _record: RevocationRecord) -> AppResult<()> {
            Ok(())
        }

        async fn lookup(&self, _revocation_id: &str) -> AppResult<Option<RevocationRecord>> {
            Ok(None)
        }

        async fn list_revoked(&self) -> AppResult<Vec<String>> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_concurrent_refresh_keeps_local_revoke() {
        let settings = RevocationSettings {
            lookup_timeout: Duration::from_secs(2),
            expected_items: 100,
            ..RevocationSettings::default()
        };
        let registry = RevocationRegistry::initialize(Arc::new(LaggingListStore), settings)
            .await
            .unwrap();

        let (refreshed, revoked) = tokio::join!(registry.refresh(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry.revoke("rid-during-refresh", "compromised").await
        });
        refreshed.unwrap();
        revoked.unwrap();
        assert!(registry.snapshot().await.might_contain("rid-during-refresh"));
    }

    #[tokio::test]
    async fn test_revoke_is_visible_immediately() {
        let registry = RevocationRegistry::initialize(
            Arc::new(InMemoryRevocationStore::new()),
            RevocationSettings::default(),
        )
        .await
        .unwrap();

        assert!(!registry.is_revoked("rid-1").await.unwrap());
        registry.revoke("rid-1", "lost device").await.unwrap();
        assert!(registry.is_revoked("rid-1").await.unwrap());
        assert!(registry.is_revoked_strong("rid-1").await.unwrap());
        assert!(!registry.is_revoked("rid-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_initialize_loads_existing_revocations() {
        let store = Arc::new(InMemoryRevocationStore::new());
        store
            .revoke(RevocationRecord::new("old", "rotated"))
            .await
            .unwrap();
        let registry = RevocationRegistry::initialize(store, RevocationSettings::default())
            .await
            .unwrap();
        assert_eq!(registry.snapshot().await.len(), 1);
        assert!(registry.is_revoked("old").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_picks_up_external_revocations() {
        let store = Arc::new(InMemoryRevocationStore::new());
        let registry = RevocationRegistry::initialize(store.clone(), RevocationSettings::default())
            .await
            .unwrap();
        store
            .revoke(RevocationRecord::new("elsewhere", "admin"))
            .await
            .unwrap();

        // Snapshot lags until refresh, strong lookup does not
        assert!(!registry.is_revoked("elsewhere").await.unwrap());
        assert!(registry.is_revoked_strong("elsewhere").await.unwrap());
        assert_eq!(registry.refresh().await.unwrap(), 1);
        assert!(registry.is_revoked("elsewhere").await.unwrap());
    }

    #[tokio::test]
    async fn test_timeout_follows_failure_mode() {
        let closed = RevocationRegistry::initialize(
            Arc::new(SlowStore),
            fast_settings(RevocationFailureMode::FailClosed),
        )
        .await
        .unwrap();
        let error = closed.is_revoked_strong("x").await.unwrap_err();
        assert_eq!(
            error.code,
            qtoken_core::errors::ErrorCode::ExternalServiceUnavailable
        );

        let open = RevocationRegistry::initialize(
            Arc::new(SlowStore),
            fast_settings(RevocationFailureMode::FailOpen),
        )
        .await
        .unwrap();
        assert!(!open.is_revoked_strong("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_task_shuts_down() {
        let registry = Arc::new(
            RevocationRegistry::initialize(
                Arc::new(InMemoryRevocationStore::new()),
                RevocationSettings {
                    refresh_interval: Duration::from_millis(10),
                    ..RevocationSettings::default()
                },
            )
            .await
            .unwrap(),
        );
        let handle = registry.spawn_refresh_task();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;
    }

    #[test]
    fn test_failure_mode_parsing() {
        assert_eq!(
            "fail_open".parse::<RevocationFailureMode>().unwrap(),
            RevocationFailureMode::FailOpen
        );
        assert_eq!(
            "CLOSED".parse::<RevocationFailureMode>().unwrap(),
            RevocationFailureMode::FailClosed
        );
        assert!("maybe".parse::<RevocationFailureMode>().is_err());
    }
}
