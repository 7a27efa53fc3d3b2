//! Orchestrator configuration module
//!
//! Configuration is read from an optional file plus environment variables
//! using the `config` and `dotenvy` crates. Environment variables use the
//! `LLM_ORCHESTRATOR` prefix and `__` as the nested separator.
//!
//! # Example
//!
//! ```no_run
//! use llm_orchestrator::config::OrchestratorConfig;
//!
//! let config = OrchestratorConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("{} providers configured", config.providers.len());
//! ```
//!
//! # File format
//!
//! ```toml
//! enable_fallback = true
//!
//! [[providers]]
//! provider = "openai"
//! api_key_env = "OPENAI_API_KEY"
//! model = "gpt-4o"
//! requests_per_minute = 60
//!
//! [[providers]]
//! provider = "claude"
//! api_key_env = "ANTHROPIC_API_KEY"
//! model = "claude-3-5-sonnet-latest"
//!
//! [health]
//! failure_threshold = 3
//! ```

mod error;
mod provider;

pub use error::{ConfigLoadError, ValidationError};
pub use provider::{AzureConfig, HostedConfig, ProviderConfig, ProviderLimits};

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::domain::provider::{HealthPolicy, RetryPolicy};

const ENV_PREFIX: &str = "LLM_ORCHESTRATOR";
const DEFAULT_CONFIG_NAME: &str = "llm-orchestrator";

/// Root orchestrator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Providers in fallback order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Whether failures move on to the next provider
    #[serde(default = "default_enable_fallback")]
    pub enable_fallback: bool,

    /// Maximum providers tried per request (default: all)
    #[serde(default)]
    pub max_fallback_depth: Option<usize>,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Health classification thresholds
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HealthConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Backoff schedule for transient failures
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl OrchestratorConfig {
    /// Load configuration from `llm-orchestrator.{toml,yaml,json}` (if present)
    /// and environment variables
    ///
    /// # Environment Variable Format
    ///
    /// - `LLM_ORCHESTRATOR__ENABLE_FALLBACK=false` -> `enable_fallback = false`
    /// - `LLM_ORCHESTRATOR__HEALTH__FAILURE_THRESHOLD=5` -> `health.failure_threshold = 5`
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::build(config::File::with_name(DEFAULT_CONFIG_NAME).required(false))
    }

    /// Load configuration from a specific file plus environment variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self, ConfigLoadError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.providers.is_empty() {
            return Err(ValidationError::NoProviders);
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            let kind = provider.kind();
            if !seen.insert(kind) {
                return Err(ValidationError::DuplicateProvider(kind.to_string()));
            }
            if !kind.supports_model(provider.model()) {
                return Err(ValidationError::UnsupportedModel {
                    provider: kind.to_string(),
                    model: provider.model().to_string(),
                });
            }
            if provider.http_endpoint().is_none() {
                return Err(ValidationError::InvalidEndpoint(kind.to_string()));
            }
            let limits = provider.limits();
            if limits.timeout_ms == Some(0) {
                return Err(ValidationError::InvalidTimeout(kind.to_string()));
            }
            if limits.requests_per_minute == Some(0) {
                return Err(ValidationError::InvalidRequestsPerMinute(kind.to_string()));
            }
        }

        if self.max_fallback_depth == Some(0) {
            return Err(ValidationError::InvalidFallbackDepth);
        }
        self.health.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

impl HealthConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::InvalidFailureThreshold);
        }
        Ok(())
    }

    /// Converts to the runtime policy
    pub fn policy(&self) -> HealthPolicy {
        HealthPolicy {
            failure_threshold: self.failure_threshold,
            failure_window: Duration::from_secs(self.failure_window_secs),
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_delay_ms == 0 || self.base_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidRetryDelays);
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ValidationError::InvalidJitter);
        }
        Ok(())
    }

    /// Converts to the runtime policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_factor: self.jitter,
            ..RetryPolicy::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_enable_fallback() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_failure_window_secs() -> u64 {
    60
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.1
}
