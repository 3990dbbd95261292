//! Reconciler configuration: env-var defaults, TOML overrides, validation.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::backoff::BackoffPolicy;
use crate::investigation::client::DEFAULT_MAX_RETRIES;
use crate::policy::PolicySource;

/// Error type for configuration validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("investigation_url must not be empty")]
    MissingInvestigationUrl,

    #[error("max_concurrent_reconciles must be at least 1")]
    ZeroConcurrency,

    #[error("backoff_base_ms must be greater than zero")]
    ZeroBackoffBase,

    #[error("backoff_base_ms ({base_ms}) exceeds backoff_max_ms ({max_ms})")]
    BackoffBaseExceedsMax { base_ms: u64, max_ms: u64 },

    #[error("request_timeout_secs must be greater than zero")]
    ZeroTimeout,
}

/// Reconciler configuration.
///
/// Defaults come from `ANALYSIS_*` environment variables; values in a TOML
/// file loaded with [`ReconcilerConfig::from_toml_file`] take precedence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Base URL of the investigation service.
    pub investigation_url: String,
    /// Per-request timeout for investigation calls.
    pub request_timeout_secs: u64,
    /// Retries after the first investigation attempt.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Worker pool size.
    pub max_concurrent_reconciles: usize,
    /// Approval policy file. `None` uses the built-in policy.
    pub policy_path: Option<PathBuf>,
    /// Version reported when the policy document carries none.
    pub policy_version: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            investigation_url: std::env::var("ANALYSIS_INVESTIGATION_URL")
                .unwrap_or_else(|_| "http://holmesgpt-api:8080".into()),
            request_timeout_secs: env_or("ANALYSIS_INVESTIGATION_TIMEOUT_SECS", 60),
            max_retries: env_or("ANALYSIS_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            backoff_base_ms: env_or("ANALYSIS_BACKOFF_BASE_MS", 1_000),
            backoff_max_ms: env_or("ANALYSIS_BACKOFF_MAX_MS", 300_000),
            max_concurrent_reconciles: env_or("ANALYSIS_MAX_CONCURRENT_RECONCILES", 4),
            policy_path: std::env::var("ANALYSIS_POLICY_PATH").ok().map(PathBuf::from),
            policy_version: std::env::var("ANALYSIS_POLICY_VERSION").ok(),
        }
    }
}

impl ReconcilerConfig {
    /// Load and validate a TOML config file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.investigation_url.trim().is_empty() {
            return Err(ConfigError::MissingInvestigationUrl);
        }
        if self.max_concurrent_reconciles == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.backoff_base_ms == 0 {
            return Err(ConfigError::ZeroBackoffBase);
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::BackoffBaseExceedsMax {
                base_ms: self.backoff_base_ms,
                max_ms: self.backoff_max_ms,
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    /// Where the approval policy comes from.
    pub fn policy_source(&self) -> PolicySource {
        match &self.policy_path {
            Some(path) => PolicySource::File(path.clone()),
            None => PolicySource::Inline(crate::policy::rules::DEFAULT_POLICY.to_string()),
        }
    }
}
