// ABOUTME: Benchmark fixtures: token requests with varying claim sets and rule-heavy policies
// ABOUTME: Deterministic so runs are comparable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

#![allow(dead_code, clippy::unwrap_used)]

use qtoken::policy::PolicyDocument;
use qtoken::revocation::{InMemoryRevocationStore, RevocationRegistry, RevocationSettings};
use qtoken::token::TokenRequest;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

pub const ISSUER: &str = "https://issuer.example";
pub const AUDIENCE: &str = "https://api.example";
pub const POLICY_ID: &str = "urn:qtoken:policy:bench";

/// Number of custom claims carried by a token
#[derive(Debug, Clone, Copy)]
pub enum ClaimSetSize {
    None,
    Small,
    Large,
}

impl ClaimSetSize {
    pub const fn count(self) -> usize {
        match self {
            Self::None => 0,
            Self::Small => 5,
            Self::Large => 50,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "no_claims",
            Self::Small => "5_claims",
            Self::Large => "50_claims",
        }
    }
}

/// Token request carrying `size` custom claims
pub fn token_request(size: ClaimSetSize, client_key_hash: [u8; 32]) -> TokenRequest {
    (0..size.count()).fold(
        TokenRequest::new("bench-user", ISSUER, vec![AUDIENCE.to_owned()], POLICY_ID)
            .with_client_key_hash(client_key_hash),
        |request, i| request.with_claim(format!("claim_{i}"), format!("value-{i}")),
    )
}

/// Empty in-memory revocation registry
pub fn revocation_registry(rt: &Runtime) -> Arc<RevocationRegistry> {
    let registry = rt
        .block_on(RevocationRegistry::initialize(
            Arc::new(InMemoryRevocationStore::new()),
            RevocationSettings::default(),
        ))
        .unwrap();
    Arc::new(registry)
}

/// Policy with `rule_count` rules where only the last one matches `resources/target`
pub fn policy_with_rules(rule_count: usize) -> PolicyDocument {
    let mut rules: Vec<_> = (0..rule_count.saturating_sub(1))
        .map(|i| {
            json!({
                "id": format!("miss-{i}"),
                "effect": "allow",
                "priority": 100,
                "resources": [format!("other/{i}/**")],
                "actions": ["read", "update"],
                "conditions": [{"type": "attribute", "source": "subject", "key": "role", "op": "eq", "value": "admin"}]
            })
        })
        .collect();
    rules.push(json!({
        "id": "target",
        "effect": "allow",
        "priority": 0,
        "resources": ["resources/*"],
        "actions": ["read"]
    }));
    serde_json::from_value(json!({
        "id": POLICY_ID,
        "version": 1,
        "issuer": ISSUER,
        "rules": rules
    }))
    .unwrap()
}
