// ABOUTME: Logging configuration and structured audit events for the token protocol
// ABOUTME: Configures tracing-subscriber formats and filters and exposes protocol event helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Structured logging setup
//!
//! Events carry identifiers (token id, revocation id, key id, policy id) and error
//! codes. Key material, token strings and claim contents are never logged.

use anyhow::Result;
use qtoken_core::constants::service_names;
use qtoken_core::errors::ErrorCode;
use serde_json::json;
use std::env;
use std::io;
use tracing::{debug, info, warn};
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const NOISY_TARGETS: [&str; 4] = ["hyper", "hyper_util", "reqwest", "h2"];

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
    /// Include thread information
    pub include_thread: bool,
    /// Include span enter/close events
    pub include_spans: bool,
    /// Service name for structured logging
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (development, staging, production)
    pub environment: String,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `JSON` format for production logging
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact format for CLI output
    Compact,
}

impl LogFormat {
    /// Parse a format name; unknown names fall back to pretty
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            include_location: false,
            include_thread: false,
            include_spans: false,
            service_name: service_names::QTOKEN.into(),
            service_version: env!("CARGO_PKG_VERSION").to_owned(),
            environment: "development".into(),
        }
    }
}

impl LoggingConfig {
    /// Read `RUST_LOG` and the `QTOKEN_LOG_*` variables
    ///
    /// Production deployments (`QTOKEN_ENVIRONMENT=production`) always record source
    /// location and thread ids.
    #[must_use]
    pub fn from_env() -> Self {
        let environment = env::var("QTOKEN_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let production = environment == "production";
        let flag = |name: &str| production || env::var(name).is_ok_and(|v| v != "0");

        Self {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            format: env::var("QTOKEN_LOG_FORMAT")
                .map_or(LogFormat::Pretty, |value| LogFormat::parse(&value)),
            include_location: flag("QTOKEN_LOG_LOCATION"),
            include_thread: flag("QTOKEN_LOG_THREADS"),
            include_spans: env::var("QTOKEN_LOG_SPANS").is_ok_and(|v| v != "0"),
            environment,
            ..Self::default()
        }
    }

    /// Configuration for command-line tools: compact, warnings only unless `RUST_LOG` says
    /// otherwise
    #[must_use]
    pub fn for_cli() -> Self {
        Self {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
            format: LogFormat::Compact,
            ..Self::from_env()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let base = env::var("RUST_LOG").map_or_else(|_| EnvFilter::new(&self.level), EnvFilter::new);
        // HTTP client internals are chatty at debug
        let quiet = NOISY_TARGETS
            .iter()
            .filter_map(|target| format!("{target}=warn").parse::<Directive>().ok());
        quiet.fold(base, EnvFilter::add_directive)
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed
    pub fn init(&self) -> Result<()> {
        let registry = tracing_subscriber::registry().with(self.env_filter());
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        match self.format {
            LogFormat::Json => {
                let json_layer = fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_thread_ids(self.include_thread)
                    .with_thread_names(self.include_thread)
                    .with_target(true)
                    .with_writer(io::stdout)
                    .with_span_events(span_events)
                    .json();
                registry.with(json_layer).try_init()?;
            }
            LogFormat::Pretty => {
                let pretty_layer = fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_thread_ids(self.include_thread)
                    .with_thread_names(self.include_thread)
                    .with_target(true)
                    .with_writer(io::stdout)
                    .with_span_events(span_events);
                registry.with(pretty_layer).try_init()?;
            }
            LogFormat::Compact => {
                // stderr keeps CLI stdout clean for tokens and JSON output
                let compact_layer = fmt::layer()
                    .compact()
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(false)
                    .with_writer(io::stderr)
                    .with_span_events(FmtSpan::NONE);
                registry.with(compact_layer).try_init()?;
            }
        }

        self.log_startup_info();
        Ok(())
    }

    fn log_startup_info(&self) {
        let config_summary = json!({
            "service": {
                "name": self.service_name,
                "version": self.service_version,
                "environment": self.environment
            },
            "logging": {
                "level": self.level,
                "format": format!("{:?}", self.format),
            }
        });
        debug!(
            service.name = %self.service_name,
            service.version = %self.service_version,
            environment = %self.environment,
            "Logging initialized: {}",
            config_summary
        );
    }
}

/// Protocol audit events
pub struct AppLogger;

impl AppLogger {
    /// Token issued
    pub fn log_token_issued(jti: &str, token_type: &str, key_id: &str, expires_at: u64) {
        info!(
            token.jti = %jti,
            token.kind = %token_type,
            token.key_id = %key_id,
            token.exp = expires_at,
            "Token issued"
        );
    }

    /// Token validated successfully
    pub fn log_token_accepted(jti: &str) {
        debug!(token.jti = %jti, "Token accepted");
    }

    /// Token rejected; only the stable code and failing stage are recorded
    pub fn log_token_rejected(code: ErrorCode, stage: &str) {
        warn!(
            rejection.code = %code,
            rejection.stage = %stage,
            "Token rejected"
        );
    }

    /// Proof-of-possession rejected
    pub fn log_proof_rejected(code: ErrorCode) {
        warn!(rejection.code = %code, "Proof of possession rejected");
    }

    /// Revocation recorded
    pub fn log_revocation(revocation_id: &str, reason: &str) {
        info!(
            revocation.id = %revocation_id,
            revocation.reason = %reason,
            "Token revoked"
        );
    }

    /// Policy decision
    pub fn log_policy_decision(
        policy_id: &str,
        effect: &str,
        matched_rule: Option<&str>,
        reason: &str,
    ) {
        info!(
            policy.id = %policy_id,
            policy.effect = %effect,
            policy.rule = matched_rule.unwrap_or("none"),
            policy.reason = %reason,
            "Policy decision"
        );
    }

    /// Dependency failure such as an unreachable revocation or policy service
    pub fn log_dependency_failure(service: &str, details: &str) {
        warn!(
            dependency.service = %service,
            dependency.details = %details,
            "External dependency failure"
        );
    }
}
