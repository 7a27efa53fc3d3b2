//! Configuration error types

use thiserror::Error;

use crate::domain::provider::ConfigError;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No providers configured")]
    NoProviders,

    #[error("Provider configured more than once: {0}")]
    DuplicateProvider(String),

    #[error("Model not supported by provider {provider}: {model}")]
    UnsupportedModel { provider: String, model: String },

    #[error("Invalid endpoint for provider {0}")]
    InvalidEndpoint(String),

    #[error("Invalid request timeout for provider {0}")]
    InvalidTimeout(String),

    #[error("requests_per_minute must be greater than zero for provider {0}")]
    InvalidRequestsPerMinute(String),

    #[error("Health failure threshold must be greater than zero")]
    InvalidFailureThreshold,

    #[error("Invalid retry delays: base must be positive and not exceed max")]
    InvalidRetryDelays,

    #[error("Retry jitter must be between 0.0 and 1.0")]
    InvalidJitter,

    #[error("max_fallback_depth must be greater than zero")]
    InvalidFallbackDepth,
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}
