// ABOUTME: Replay-prevention cache of proof nonces with per-entry expiry
// ABOUTME: Sharded concurrent map so validating threads do not contend on one lock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::tasks::{self, BackgroundTask};
use crate::token::unix_now_ms;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Seen nonces and the time (ms) until which each must be remembered
///
/// An entry is live up to and including its expiry instant, matching the verifier's
/// inclusive freshness window.
#[derive(Debug, Default)]
pub struct NonceCache {
    entries: DashMap<String, u64>,
}

impl NonceCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the nonce is recorded and live at `now_ms`
    #[must_use]
    pub fn contains(&self, nonce: &str, now_ms: u64) -> bool {
        self.entries
            .get(nonce)
            .is_some_and(|expires_at| *expires_at >= now_ms)
    }

    /// Record a nonce until `expires_at_ms`
    ///
    /// Returns `false` if a live entry already exists. Check and insert happen under
    /// one shard lock, so of two concurrent callers exactly one wins.
    pub fn record(&self, nonce: &str, expires_at_ms: u64, now_ms: u64) -> bool {
        match self.entries.entry(nonce.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() >= now_ms {
                    false
                } else {
                    occupied.insert(expires_at_ms);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at_ms);
                true
            }
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at >= now_ms);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, including expired ones not yet purged
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Purge expired entries every `period`
    #[must_use]
    pub fn spawn_purge_task(self: &Arc<Self>, period: Duration) -> BackgroundTask {
        let cache = Arc::clone(self);
        tasks::spawn_periodic("nonce-purge", period, move || {
            let cache = cache.clone();
            async move {
                let removed = cache.purge_expired(unix_now_ms());
                if removed > 0 {
                    debug!("Purged {} expired proof nonces", removed);
                }
            }
        })
    }
}
