// ABOUTME: Environment-based protocol configuration for issuers and resource servers
// ABOUTME: Token, proof, revocation and policy settings read from QTOKEN_* variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::policy::{HttpPolicySource, PolicyStore, PolicyStoreSettings};
use crate::revocation::{
    HttpRevocationService, InMemoryRevocationStore, RevocationFailureMode, RevocationSettings,
    RevocationStore,
};
use crate::token::ValidatorConfig;
use qtoken_core::constants::defaults::{
    BLOOM_EXPECTED_ITEMS, BLOOM_FALSE_POSITIVE_RATE, CLAIM_LEEWAY_SECS, CLOCK_SKEW_SECS,
    DECISION_CACHE_SIZE, POLICY_FETCH_TIMEOUT_MS, POLICY_MAX_AGE_SECS, REVOCATION_REFRESH_SECS,
    REVOCATION_TIMEOUT_MS, TOKEN_VALIDITY_SECS,
};
use qtoken_core::constants::proof::DEFAULT_WINDOW_SECS;
use qtoken_core::errors::{AppError, AppResult};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Token issuance and validation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Issuer URL placed in and expected from tokens (`QTOKEN_ISSUER`)
    pub issuer: Option<String>,
    /// Audience this resource server accepts (`QTOKEN_AUDIENCE`)
    pub audience: Option<String>,
    /// Default validity (`QTOKEN_TOKEN_VALIDITY_SECS`)
    pub validity_secs: u64,
    /// Allowed future skew of the header timestamp (`QTOKEN_CLOCK_SKEW_SECS`)
    pub clock_skew_secs: u64,
    /// Leeway applied to `exp` and `nbf` (`QTOKEN_CLAIM_LEEWAY_SECS`)
    pub claim_leeway_secs: u64,
    /// Issuer or verification key file (`QTOKEN_KEY_FILE`)
    pub key_file: Option<PathBuf>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            validity_secs: TOKEN_VALIDITY_SECS,
            clock_skew_secs: CLOCK_SKEW_SECS,
            claim_leeway_secs: CLAIM_LEEWAY_SECS,
            key_file: None,
        }
    }
}

impl TokenConfig {
    /// Load from the environment
    ///
    /// # Errors
    ///
    /// Returns `config-invalid` for unparseable values
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            issuer: env_opt("QTOKEN_ISSUER"),
            audience: env_opt("QTOKEN_AUDIENCE"),
            validity_secs: env_parse("QTOKEN_TOKEN_VALIDITY_SECS", TOKEN_VALIDITY_SECS)?,
            clock_skew_secs: env_parse("QTOKEN_CLOCK_SKEW_SECS", CLOCK_SKEW_SECS)?,
            claim_leeway_secs: env_parse("QTOKEN_CLAIM_LEEWAY_SECS", CLAIM_LEEWAY_SECS)?,
            key_file: env_opt("QTOKEN_KEY_FILE").map(PathBuf::from),
        })
    }

    /// Validator settings for this resource server
    ///
    /// # Errors
    ///
    /// Returns `config-error` if the issuer or audience is not configured
    pub fn validator_config(&self) -> AppResult<ValidatorConfig> {
        let issuer = self
            .issuer
            .clone()
            .ok_or_else(|| AppError::config("QTOKEN_ISSUER is not set"))?;
        let audience = self
            .audience
            .clone()
            .ok_or_else(|| AppError::config("QTOKEN_AUDIENCE is not set"))?;
        let mut config = ValidatorConfig::new(issuer, audience);
        config.clock_skew_secs = self.clock_skew_secs;
        config.claim_leeway_secs = self.claim_leeway_secs;
        Ok(config)
    }
}

/// Proof-of-possession settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofConfig {
    /// Accepted distance between proof timestamp and now (`QTOKEN_PROOF_WINDOW_SECS`)
    pub window_secs: u64,
    /// Reject requests without a proof header (`QTOKEN_REQUIRE_PROOF`)
    pub require_proof: bool,
    /// Interval between nonce cache purges (`QTOKEN_NONCE_PURGE_SECS`)
    pub nonce_purge_interval_secs: u64,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            require_proof: true,
            nonce_purge_interval_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl ProofConfig {
    /// Load from the environment
    ///
    /// # Errors
    ///
    /// Returns `config-invalid` for unparseable values
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            window_secs: env_parse("QTOKEN_PROOF_WINDOW_SECS", DEFAULT_WINDOW_SECS)?,
            require_proof: env_parse("QTOKEN_REQUIRE_PROOF", true)?,
            nonce_purge_interval_secs: env_parse("QTOKEN_NONCE_PURGE_SECS", DEFAULT_WINDOW_SECS)?,
        })
    }

    /// Nonce purge interval
    #[must_use]
    pub const fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.nonce_purge_interval_secs)
    }
}

/// Revocation registry settings
#[derive(Debug, Clone, PartialEq)]
pub struct RevocationConfig {
    /// Revocation service base URL; in-memory store when unset (`QTOKEN_REVOCATION_URL`)
    pub service_url: Option<String>,
    /// Snapshot refresh interval (`QTOKEN_REVOCATION_REFRESH_SECS`)
    pub refresh_interval_secs: u64,
    /// Authoritative lookup timeout (`QTOKEN_REVOCATION_TIMEOUT_MS`)
    pub lookup_timeout_ms: u64,
    /// Behaviour when the store is unavailable (`QTOKEN_REVOCATION_FAIL_MODE`)
    pub failure_mode: RevocationFailureMode,
    /// Bloom filter sizing (`QTOKEN_REVOCATION_EXPECTED_ITEMS`)
    pub expected_items: usize,
    /// Bloom filter false-positive rate (`QTOKEN_REVOCATION_FALSE_POSITIVE_RATE`)
    pub false_positive_rate: f64,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            refresh_interval_secs: REVOCATION_REFRESH_SECS,
            lookup_timeout_ms: REVOCATION_TIMEOUT_MS,
            failure_mode: RevocationFailureMode::default(),
            expected_items: BLOOM_EXPECTED_ITEMS,
            false_positive_rate: BLOOM_FALSE_POSITIVE_RATE,
        }
    }
}

impl RevocationConfig {
    /// Load from the environment
    ///
    /// # Errors
    ///
    /// Returns `config-invalid` for unparseable values
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            service_url: env_opt("QTOKEN_REVOCATION_URL"),
            refresh_interval_secs: env_parse(
                "QTOKEN_REVOCATION_REFRESH_SECS",
                REVOCATION_REFRESH_SECS,
            )?,
            lookup_timeout_ms: env_parse("QTOKEN_REVOCATION_TIMEOUT_MS", REVOCATION_TIMEOUT_MS)?,
            failure_mode: env_parse(
                "QTOKEN_REVOCATION_FAIL_MODE",
                RevocationFailureMode::default(),
            )?,
            expected_items: env_parse("QTOKEN_REVOCATION_EXPECTED_ITEMS", BLOOM_EXPECTED_ITEMS)?,
            false_positive_rate: env_parse(
                "QTOKEN_REVOCATION_FALSE_POSITIVE_RATE",
                BLOOM_FALSE_POSITIVE_RATE,
            )?,
        })
    }

    /// Registry settings
    #[must_use]
    pub fn settings(&self) -> RevocationSettings {
        RevocationSettings {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
            failure_mode: self.failure_mode,
            expected_items: self.expected_items,
            false_positive_rate: self.false_positive_rate,
        }
    }

    /// Authoritative store: the HTTP service when configured, otherwise in-memory
    #[must_use]
    pub fn store(&self) -> Arc<dyn RevocationStore> {
        match &self.service_url {
            Some(url) => Arc::new(HttpRevocationService::new(
                url.clone(),
                Duration::from_millis(self.lookup_timeout_ms),
            )),
            None => Arc::new(InMemoryRevocationStore::new()),
        }
    }
}

/// Policy store and engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Policy store base URL; local documents only when unset (`QTOKEN_POLICY_URL`)
    pub store_url: Option<String>,
    /// Fetch timeout (`QTOKEN_POLICY_FETCH_TIMEOUT_MS`)
    pub fetch_timeout_ms: u64,
    /// Freshness when the store sends no max-age (`QTOKEN_POLICY_MAX_AGE_SECS`)
    pub default_max_age_secs: u64,
    /// Decision cache entries, zero disables (`QTOKEN_DECISION_CACHE_SIZE`)
    pub decision_cache_size: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            fetch_timeout_ms: POLICY_FETCH_TIMEOUT_MS,
            default_max_age_secs: POLICY_MAX_AGE_SECS,
            decision_cache_size: DECISION_CACHE_SIZE,
        }
    }
}

impl PolicyConfig {
    /// Load from the environment
    ///
    /// # Errors
    ///
    /// Returns `config-invalid` for unparseable values
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            store_url: env_opt("QTOKEN_POLICY_URL"),
            fetch_timeout_ms: env_parse("QTOKEN_POLICY_FETCH_TIMEOUT_MS", POLICY_FETCH_TIMEOUT_MS)?,
            default_max_age_secs: env_parse("QTOKEN_POLICY_MAX_AGE_SECS", POLICY_MAX_AGE_SECS)?,
            decision_cache_size: env_parse("QTOKEN_DECISION_CACHE_SIZE", DECISION_CACHE_SIZE)?,
        })
    }

    /// Store settings
    #[must_use]
    pub const fn store_settings(&self) -> PolicyStoreSettings {
        PolicyStoreSettings {
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            default_max_age: Duration::from_secs(self.default_max_age_secs),
        }
    }

    /// Policy store, backed by the HTTP policy source when configured
    #[must_use]
    pub fn store(&self) -> PolicyStore {
        match &self.store_url {
            Some(url) => PolicyStore::with_source(
                Arc::new(HttpPolicySource::new(
                    url.clone(),
                    Duration::from_millis(self.fetch_timeout_ms),
                )),
                self.store_settings(),
            ),
            None => PolicyStore::new(),
        }
    }
}

/// Complete protocol configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolConfig {
    /// Token settings
    pub token: TokenConfig,
    /// Proof settings
    pub proof: ProofConfig,
    /// Revocation settings
    pub revocation: RevocationConfig,
    /// Policy settings
    pub policy: PolicyConfig,
}

impl ProtocolConfig {
    /// Load and validate configuration from `QTOKEN_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns `config-invalid` for unparseable or out-of-range values
    pub fn from_env() -> AppResult<Self> {
        let config = Self {
            token: TokenConfig::from_env()?,
            proof: ProofConfig::from_env()?,
            revocation: RevocationConfig::from_env()?,
            policy: PolicyConfig::from_env()?,
        };
        config.validate()?;
        info!("{}", config.summary());
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `config-invalid` naming the offending variable
    pub fn validate(&self) -> AppResult<()> {
        let checks = [
            (self.token.validity_secs == 0, "QTOKEN_TOKEN_VALIDITY_SECS must be positive"),
            (self.proof.window_secs == 0, "QTOKEN_PROOF_WINDOW_SECS must be positive"),
            (
                self.proof.nonce_purge_interval_secs == 0,
                "QTOKEN_NONCE_PURGE_SECS must be positive",
            ),
            (
                self.revocation.refresh_interval_secs == 0,
                "QTOKEN_REVOCATION_REFRESH_SECS must be positive",
            ),
            (
                self.revocation.lookup_timeout_ms == 0,
                "QTOKEN_REVOCATION_TIMEOUT_MS must be positive",
            ),
            (
                self.revocation.expected_items == 0,
                "QTOKEN_REVOCATION_EXPECTED_ITEMS must be positive",
            ),
            (
                !(self.revocation.false_positive_rate > 0.0
                    && self.revocation.false_positive_rate < 1.0),
                "QTOKEN_REVOCATION_FALSE_POSITIVE_RATE must be between 0 and 1",
            ),
            (
                self.policy.fetch_timeout_ms == 0,
                "QTOKEN_POLICY_FETCH_TIMEOUT_MS must be positive",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(AppError::config_invalid(*message)),
            None => Ok(()),
        }
    }

    /// One-line summary without secrets
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "QToken configuration: issuer={} audience={} validity={}s skew={}s leeway={}s \
             proof_window={}s require_proof={} revocation={} fail_mode={} policy_store={}",
            self.token.issuer.as_deref().unwrap_or("unset"),
            self.token.audience.as_deref().unwrap_or("unset"),
            self.token.validity_secs,
            self.token.clock_skew_secs,
            self.token.claim_leeway_secs,
            self.proof.window_secs,
            self.proof.require_proof,
            self.revocation.service_url.as_deref().unwrap_or("in-memory"),
            self.revocation.failure_mode,
            self.policy.store_url.as_deref().unwrap_or("local"),
        )
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::config_invalid(format!("invalid {key} value '{raw}': {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtoken_core::errors::ErrorCode;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "QTOKEN_ISSUER",
        "QTOKEN_AUDIENCE",
        "QTOKEN_PROOF_WINDOW_SECS",
        "QTOKEN_REQUIRE_PROOF",
        "QTOKEN_REVOCATION_FAIL_MODE",
        "QTOKEN_REVOCATION_FALSE_POSITIVE_RATE",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_environment() {
        clear();
        let config = ProtocolConfig::from_env().unwrap();
        assert_eq!(config.proof.window_secs, 60);
        assert!(config.proof.require_proof);
        assert_eq!(config.revocation.failure_mode, RevocationFailureMode::FailClosed);
        assert_eq!(config.token.clock_skew_secs, 300);
        assert_eq!(config.token.claim_leeway_secs, 0);
        assert!(config.token.validator_config().is_err());
    }

    #[test]
    #[serial]
    fn test_reads_overrides() {
        clear();
        env::set_var("QTOKEN_ISSUER", "https://issuer.example");
        env::set_var("QTOKEN_AUDIENCE", "https://api.example");
        env::set_var("QTOKEN_REQUIRE_PROOF", "false");
        env::set_var("QTOKEN_REVOCATION_FAIL_MODE", "fail-open");
        let config = ProtocolConfig::from_env().unwrap();
        clear();

        assert!(!config.proof.require_proof);
        assert_eq!(config.revocation.failure_mode, RevocationFailureMode::FailOpen);
        let validator = config.token.validator_config().unwrap();
        assert_eq!(validator.expected_issuer, "https://issuer.example");
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        clear();
        env::set_var("QTOKEN_PROOF_WINDOW_SECS", "soon");
        let error = ProtocolConfig::from_env().unwrap_err();
        assert_eq!(error.code, ErrorCode::ConfigInvalid);

        env::set_var("QTOKEN_PROOF_WINDOW_SECS", "0");
        assert_eq!(
            ProtocolConfig::from_env().unwrap_err().code,
            ErrorCode::ConfigInvalid
        );

        clear();
        env::set_var("QTOKEN_REVOCATION_FALSE_POSITIVE_RATE", "1.5");
        assert_eq!(
            ProtocolConfig::from_env().unwrap_err().code,
            ErrorCode::ConfigInvalid
        );
        clear();
    }
}
