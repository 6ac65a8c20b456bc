// ABOUTME: Policy commands for qtoken-cli
// ABOUTME: Evaluates a local policy document against a request context
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::helpers::args::key_value;
use chrono::{DateTime, Utc};
use qtoken::errors::{AppError, AppResult};
use qtoken::policy::{EvaluationContext, PolicyDocument, PolicyEngine, PolicyStore};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments of `evaluate`
pub struct EvaluateArgs {
    pub policy: PathBuf,
    pub subject: String,
    pub resource: String,
    pub action: String,
    pub subject_attrs: Vec<String>,
    pub attrs: Vec<String>,
    pub ip: Option<IpAddr>,
    pub at: Option<String>,
}

impl EvaluateArgs {
    fn context(&self) -> AppResult<EvaluationContext> {
        let mut context = EvaluationContext::new(&self.subject, &self.resource, &self.action);
        for raw in &self.subject_attrs {
            let (key, value) = key_value(raw)?;
            context = context.with_subject_attribute(key, value);
        }
        for raw in &self.attrs {
            let (key, value) = key_value(raw)?;
            context = context.with_attribute(key, value);
        }
        if let Some(ip) = self.ip {
            context = context.with_ip(ip);
        }
        if let Some(at) = &self.at {
            let time = DateTime::parse_from_rfc3339(at)
                .map_err(|e| AppError::config_invalid(format!("invalid --at time: {e}")))?;
            context = context.at(time.with_timezone(&Utc));
        }
        Ok(context)
    }
}

/// Evaluate and print the decision as JSON
pub async fn evaluate(args: EvaluateArgs) -> AppResult<()> {
    let raw = std::fs::read_to_string(&args.policy).map_err(|e| {
        AppError::config(format!("cannot read {}: {e}", args.policy.display()))
    })?;
    let document = PolicyDocument::from_json(&raw)?;
    let policy_id = document.id.clone();

    let store = Arc::new(PolicyStore::new());
    store.load_policy(document).await?;
    let engine = PolicyEngine::with_cache_capacity(store, 0);

    let decision = engine.evaluate(&policy_id, &args.context()?).await;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
