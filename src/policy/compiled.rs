// ABOUTME: Compiled policy documents and the pure rule evaluation algorithm
// ABOUTME: Priority-ordered first-match over resource, action and condition checks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::conditions::{CompiledCondition, TimeSensitivity};
use super::context::EvaluationContext;
use super::document::{Effect, PolicyDocument, PolicyRule};
use super::pattern::ResourcePattern;
use crate::crypto::Hash32;
use qtoken_core::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Reason given when no rule matched
pub const NO_MATCHING_RULE: &str = "no matching rule";
/// Reason given for an unknown policy reference
pub const UNKNOWN_POLICY: &str = "unknown policy";

/// Authorization outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Allow or deny
    pub effect: Effect,
    /// Rule that decided, if any
    pub matched_rule_id: Option<String>,
    /// Human-readable reason
    pub reason: String,
    /// Policy the decision came from
    pub policy_id: String,
    /// Policy version, absent when the policy could not be resolved
    pub policy_version: Option<u64>,
}

impl Decision {
    /// Whether the action is permitted
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }

    /// Deny decision for a policy that could not be used
    pub fn deny_unresolved(policy_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            effect: Effect::Deny,
            matched_rule_id: None,
            reason: reason.into(),
            policy_id: policy_id.into(),
            policy_version: None,
        }
    }
}

#[derive(Debug, Clone)]
enum ActionMatcher {
    Any,
    Names(Vec<String>),
}

impl ActionMatcher {
    fn matches(&self, action: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Names(names) => names.iter().any(|n| n.eq_ignore_ascii_case(action)),
        }
    }
}

/// Rule ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledRule {
    id: String,
    effect: Effect,
    priority: i32,
    resources: Vec<ResourcePattern>,
    actions: ActionMatcher,
    conditions: Vec<CompiledCondition>,
}

impl CompiledRule {
    fn compile(rule: &PolicyRule) -> AppResult<Self> {
        if rule.resources.is_empty() {
            return Err(AppError::policy_invalid(format!(
                "rule '{}' has no resources",
                rule.id
            )));
        }
        if rule.actions.is_empty() || rule.actions.iter().any(|a| a.trim().is_empty()) {
            return Err(AppError::policy_invalid(format!(
                "rule '{}' needs non-empty actions",
                rule.id
            )));
        }

        let actions = if rule.actions.iter().any(|a| a == "*") {
            ActionMatcher::Any
        } else {
            ActionMatcher::Names(rule.actions.clone())
        };

        Ok(Self {
            id: rule.id.clone(),
            effect: rule.effect,
            priority: rule.priority,
            resources: rule
                .resources
                .iter()
                .map(|r| ResourcePattern::compile(r))
                .collect::<AppResult<_>>()?,
            actions,
            conditions: rule
                .conditions
                .iter()
                .map(CompiledCondition::compile)
                .collect::<AppResult<_>>()?,
        })
    }

    /// Rule id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rule effect
    #[must_use]
    pub const fn effect(&self) -> Effect {
        self.effect
    }

    /// Rule priority
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Resource, then action, then every condition
    #[must_use]
    pub fn matches(&self, context: &EvaluationContext) -> bool {
        self.resources.iter().any(|p| p.matches(&context.resource))
            && self.actions.matches(&context.action)
            && self.conditions.iter().all(|c| c.holds(context))
    }
}

/// Validated policy with rules in evaluation order
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    document: PolicyDocument,
    digest: Hash32,
    rules: Vec<CompiledRule>,
    time_sensitivity: TimeSensitivity,
}

impl CompiledPolicy {
    /// Validate and compile a document
    ///
    /// # Errors
    ///
    /// Returns `policy-invalid` for missing ids, duplicate rule ids or any pattern,
    /// range, regex or time that does not parse
    pub fn compile(document: PolicyDocument) -> AppResult<Self> {
        if document.id.trim().is_empty() {
            return Err(AppError::policy_invalid("policy id must not be empty"));
        }
        if document.issuer.trim().is_empty() {
            return Err(AppError::policy_invalid("policy issuer must not be empty"));
        }
        if document.id.contains('@') {
            return Err(AppError::policy_invalid(
                "policy id must not contain '@', which separates pinned versions",
            ));
        }

        let mut seen = HashSet::new();
        for rule in &document.rules {
            if rule.id.trim().is_empty() {
                return Err(AppError::policy_invalid("rule id must not be empty"));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(AppError::policy_invalid(format!(
                    "duplicate rule id '{}'",
                    rule.id
                )));
            }
        }

        let mut rules = document
            .rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<AppResult<Vec<_>>>()?;
        // Stable sort keeps document order among equal priorities
        rules.sort_by_key(|rule| Reverse(rule.priority));
        let time_sensitivity = rules
            .iter()
            .flat_map(|rule| &rule.conditions)
            .map(CompiledCondition::time_sensitivity)
            .max()
            .unwrap_or_default();

        Ok(Self {
            digest: document.digest()?,
            document,
            rules,
            time_sensitivity,
        })
    }

    /// Policy id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.document.id
    }

    /// Policy version
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.document.version
    }

    /// Source document
    #[must_use]
    pub const fn document(&self) -> &PolicyDocument {
        &self.document
    }

    /// Content digest
    #[must_use]
    pub const fn digest(&self) -> &Hash32 {
        &self.digest
    }

    /// Rules in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Finest time resolution any rule condition reads
    #[must_use]
    pub const fn time_sensitivity(&self) -> TimeSensitivity {
        self.time_sensitivity
    }

    /// Evaluate a context; pure and deterministic
    #[must_use]
    pub fn evaluate(&self, context: &EvaluationContext) -> Decision {
        let matched = self.rules.iter().find(|rule| rule.matches(context));
        match matched {
            Some(rule) => Decision {
                effect: rule.effect,
                matched_rule_id: Some(rule.id.clone()),
                reason: format!("matched rule '{}'", rule.id),
                policy_id: self.document.id.clone(),
                policy_version: Some(self.document.version),
            },
            None => Decision {
                effect: self.document.default_effect,
                matched_rule_id: None,
                reason: NO_MATCHING_RULE.to_owned(),
                policy_id: self.document.id.clone(),
                policy_version: Some(self.document.version),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(rules: serde_json::Value) -> CompiledPolicy {
        let document: PolicyDocument = serde_json::from_value(json!({
            "id": "urn:qtoken:policy:projects",
            "version": 1,
            "issuer": "https://issuer.example",
            "rules": rules
        }))
        .unwrap();
        CompiledPolicy::compile(document).unwrap()
    }

    #[test]
    fn test_priority_beats_document_order() {
        let policy = policy(json!([
            {"id": "A", "effect": "allow", "priority": 10, "resources": ["projects/*"], "actions": ["read"]},
            {"id": "B", "effect": "deny", "priority": 100, "resources": ["projects/secret"], "actions": ["*"]}
        ]));
        let decision = policy.evaluate(&EvaluationContext::new("u", "projects/secret", "read"));
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.matched_rule_id.as_deref(), Some("B"));

        let decision = policy.evaluate(&EvaluationContext::new("u", "projects/open", "read"));
        assert!(decision.is_allowed());
        assert_eq!(decision.matched_rule_id.as_deref(), Some("A"));
    }

    #[test]
    fn test_ties_keep_document_order() {
        let policy = policy(json!([
            {"id": "first", "effect": "deny", "resources": ["docs/**"], "actions": ["*"]},
            {"id": "second", "effect": "allow", "resources": ["docs/**"], "actions": ["*"]}
        ]));
        let decision = policy.evaluate(&EvaluationContext::new("u", "docs/a", "read"));
        assert_eq!(decision.matched_rule_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_default_deny() {
        let policy = policy(json!([
            {"id": "A", "effect": "allow", "resources": ["projects/*"], "actions": ["read"]}
        ]));
        let decision = policy.evaluate(&EvaluationContext::new("u", "projects/a", "delete"));
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.reason, NO_MATCHING_RULE);
        assert_eq!(decision.matched_rule_id, None);
    }

    #[test]
    fn test_failed_condition_falls_through() {
        let policy = policy(json!([
            {"id": "mfa-only", "effect": "allow", "priority": 5, "resources": ["admin/**"],
             "actions": ["*"], "conditions": [{"type": "mfa"}]}
        ]));
        let decision = policy.evaluate(&EvaluationContext::new("u", "admin/users", "read"));
        assert_eq!(decision.reason, NO_MATCHING_RULE);
    }

    #[test]
    fn test_validation_errors() {
        let duplicate: PolicyDocument = serde_json::from_value(json!({
            "id": "p", "version": 1, "issuer": "i",
            "rules": [
                {"id": "r", "effect": "allow", "resources": ["a"], "actions": ["read"]},
                {"id": "r", "effect": "deny", "resources": ["b"], "actions": ["read"]}
            ]
        }))
        .unwrap();
        assert!(CompiledPolicy::compile(duplicate).is_err());

        let no_actions: PolicyDocument = serde_json::from_value(json!({
            "id": "p", "version": 1, "issuer": "i",
            "rules": [{"id": "r", "effect": "allow", "resources": ["a"], "actions": []}]
        }))
        .unwrap();
        assert!(CompiledPolicy::compile(no_actions).is_err());
    }
}
