// ABOUTME: Authoritative revocation store interface and in-memory implementation
// ABOUTME: Point lookups, writes and full listings used to rebuild the bloom snapshot
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use qtoken_core::errors::AppResult;
use serde::{Deserialize, Serialize};

/// One revoked token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    /// Revocation id from the token payload
    pub revocation_id: String,
    /// Free-form reason
    pub reason: String,
    /// When the revocation was recorded
    pub revoked_at: DateTime<Utc>,
}

impl RevocationRecord {
    /// Record stamped with the current time
    pub fn new(revocation_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            revocation_id: revocation_id.into(),
            reason: reason.into(),
            revoked_at: Utc::now(),
        }
    }
}

/// Authoritative source of revocation state
///
/// Once `revoke` succeeds, `lookup` for that id must return the record.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Persist a revocation; revoking twice keeps the first record
    async fn revoke(&self, record: RevocationRecord) -> AppResult<()>;

    /// Point lookup by revocation id
    async fn lookup(&self, revocation_id: &str) -> AppResult<Option<RevocationRecord>>;

    /// Every revoked id, used to rebuild the bloom snapshot
    async fn list_revoked(&self) -> AppResult<Vec<String>>;
}

/// Process-local store backed by a sharded map
#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    records: DashMap<String, RevocationRecord>,
}

impl InMemoryRevocationStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored revocations
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, record: RevocationRecord) -> AppResult<()> {
        self.records
            .entry(record.revocation_id.clone())
            .or_insert(record);
        Ok(())
    }

    async fn lookup(&self, revocation_id: &str) -> AppResult<Option<RevocationRecord>> {
        Ok(self
            .records
            .get(revocation_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_revoked(&self) -> AppResult<Vec<String>> {
        Ok(self.records.iter().map(|entry| entry.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_revocation_wins() {
        let store = InMemoryRevocationStore::new();
        store
            .revoke(RevocationRecord::new("abc", "compromised"))
            .await
            .unwrap();
        store
            .revoke(RevocationRecord::new("abc", "duplicate"))
            .await
            .unwrap();

        let record = store.lookup("abc").await.unwrap().unwrap();
        assert_eq!(record.reason, "compromised");
        assert_eq!(store.len(), 1);
        assert!(store.lookup("missing").await.unwrap().is_none());
        assert_eq!(store.list_revoked().await.unwrap(), vec!["abc".to_owned()]);
    }
}
