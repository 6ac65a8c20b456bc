// ABOUTME: Attribute-based policy evaluation for resource, action and context
// ABOUTME: Versioned documents, compiled rules, condition checks and decision caching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Policy engine
//!
//! Documents are validated and compiled once, when they are published to the
//! [`PolicyStore`]. Evaluation over a compiled document is a pure function of the
//! document and the [`EvaluationContext`]: rules are tried in descending priority
//! (document order breaks ties) and the first rule whose resource, action and
//! conditions all match decides. Anything the engine cannot resolve is denied.

/// Compiled documents and rule evaluation
pub mod compiled;
/// Condition compilation and checks
pub mod conditions;
/// Evaluation context
pub mod context;
/// Policy document schema
pub mod document;
/// Engine and decision cache
pub mod engine;
/// Resource glob patterns
pub mod pattern;
/// Policy sources
pub mod source;
/// Versioned policy store
pub mod store;

pub use compiled::{CompiledPolicy, Decision, NO_MATCHING_RULE, UNKNOWN_POLICY};
pub use conditions::{IpRange, TimeSensitivity};
pub use context::{DeviceContext, EvaluationContext, MfaContext, SubjectContext};
pub use document::{AttributeSource, ComparisonOp, Condition, Effect, PolicyDocument, PolicyRule};
pub use engine::{PolicyEngine, POLICY_UNAVAILABLE};
pub use pattern::ResourcePattern;
pub use source::{FetchOutcome, HttpPolicySource, PolicyRef, PolicySource, StaticPolicySource};
pub use store::{PolicySet, PolicyStore, PolicyStoreSettings};
