// ABOUTME: Policy engine resolving policy references and evaluating request contexts
// ABOUTME: Never errors: unknown or unavailable policies become deny decisions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::compiled::{CompiledPolicy, Decision, UNKNOWN_POLICY};
use super::context::EvaluationContext;
use super::source::PolicyRef;
use super::store::PolicyStore;
use crate::crypto::Hash32;
use crate::logging::AppLogger;
use lru::LruCache;
use qtoken_core::constants::defaults::DECISION_CACHE_SIZE;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Reason given when the policy source is down and nothing is cached
pub const POLICY_UNAVAILABLE: &str = "policy unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DecisionKey {
    policy_id: String,
    version: u64,
    context: Hash32,
}

/// Authorization decisions over the policy store
pub struct PolicyEngine {
    store: Arc<PolicyStore>,
    decisions: Option<Mutex<LruCache<DecisionKey, Decision>>>,
}

impl PolicyEngine {
    /// Engine with the default decision cache size
    #[must_use]
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self::with_cache_capacity(store, DECISION_CACHE_SIZE)
    }

    /// Engine caching up to `capacity` decisions; zero disables the cache
    #[must_use]
    pub fn with_cache_capacity(store: Arc<PolicyStore>, capacity: usize) -> Self {
        Self {
            store,
            decisions: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Underlying store
    #[must_use]
    pub const fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Evaluate a context against the policy named by `policy_ref` (`id` or `id@version`)
    pub async fn evaluate(&self, policy_ref: &str, context: &EvaluationContext) -> Decision {
        match policy_ref.parse::<PolicyRef>() {
            Ok(reference) => self.evaluate_ref(&reference, context).await,
            Err(_) => Self::audit(Decision::deny_unresolved(policy_ref, UNKNOWN_POLICY)),
        }
    }

    /// Evaluate against a parsed reference
    pub async fn evaluate_ref(&self, reference: &PolicyRef, context: &EvaluationContext) -> Decision {
        let policy = match self.store.resolve(reference).await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                return Self::audit(Decision::deny_unresolved(
                    reference.to_string(),
                    UNKNOWN_POLICY,
                ))
            }
            Err(_) => {
                return Self::audit(Decision::deny_unresolved(
                    reference.to_string(),
                    POLICY_UNAVAILABLE,
                ))
            }
        };
        Self::audit(self.decide(&policy, context).await)
    }

    async fn decide(&self, policy: &CompiledPolicy, context: &EvaluationContext) -> Decision {
        let digest = context.digest_for(policy.time_sensitivity());
        let (Some(cache), Some(digest)) = (&self.decisions, digest) else {
            return policy.evaluate(context);
        };
        let key = DecisionKey {
            policy_id: policy.id().to_owned(),
            version: policy.version(),
            context: digest,
        };

        // LruCache::get updates recency, so even lookups take the lock mutably
        let mut cache = cache.lock().await;
        if let Some(decision) = cache.get(&key) {
            return decision.clone();
        }
        let decision = policy.evaluate(context);
        cache.put(key, decision.clone());
        decision
    }

    fn audit(decision: Decision) -> Decision {
        AppLogger::log_policy_decision(
            &decision.policy_id,
            decision.effect.as_str(),
            decision.matched_rule_id.as_deref(),
            &decision.reason,
        );
        decision
    }

    /// Number of cached decisions
    pub async fn cached_decisions(&self) -> usize {
        match &self.decisions {
            Some(cache) => cache.lock().await.len(),
            None => 0,
        }
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("store", &self.store)
            .field("cache_enabled", &self.decisions.is_some())
            .finish()
    }
}
