//! Error taxonomy for construction and for calls.

use std::fmt;
use std::time::Duration;

use super::kind::{Capability, ProviderKind};
use crate::domain::foundation::ProviderId;

/// Construction-time errors. Never retried, never trigger a network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No API key (or an empty one) was supplied.
    #[error("API key is required for provider {provider}")]
    MissingApiKey {
        /// Provider being configured.
        provider: ProviderKind,
    },

    /// The model is not part of the provider's known model set.
    #[error("Model not supported by provider {provider}: {model}")]
    UnsupportedModel {
        /// Provider being configured.
        provider: ProviderKind,
        /// Rejected model name.
        model: String,
    },

    /// The endpoint is not an absolute http(s) URL.
    #[error("invalid endpoint for provider {provider}: {endpoint}")]
    InvalidEndpoint {
        /// Provider being configured.
        provider: ProviderKind,
        /// Rejected endpoint.
        endpoint: String,
    },

    /// A timeout or rate limit of zero, which would stall every request.
    #[error("{setting} must be greater than zero for provider {provider}")]
    ZeroLimit {
        /// Provider being configured.
        provider: ProviderKind,
        /// Offending setting.
        setting: &'static str,
    },

    /// The configuration file failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Two adapters were configured with the same id.
    #[error("provider configured more than once: {0}")]
    DuplicateProvider(ProviderId),

    /// A manager was created without adapters.
    #[error("at least one provider must be configured")]
    NoProviders,
}

impl ConfigError {
    /// Creates an unsupported model error.
    pub fn unsupported_model(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self::UnsupportedModel {
            provider,
            model: model.into(),
        }
    }
}

/// Coarse classification of call failures, used for logs and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    RateLimit,
    QuotaExceeded,
    Timeout,
    Network,
    Server,
    NotFound,
    Capability,
    Cancelled,
    InvalidRequest,
    InvalidResponse,
    AllProvidersFailed,
}

/// Errors from sending or streaming a request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Credentials rejected (401/403).
    #[error("Authentication failed: {message}")]
    Auth {
        /// Provider message, with the key redacted.
        message: String,
    },

    /// Rate limited by the provider (429).
    #[error("Rate limit exceeded{}", retry_hint(.retry_after))]
    RateLimited {
        /// How long the provider asked us to wait, when it said so.
        retry_after: Option<Duration>,
    },

    /// Cumulative token quota reached; no network call was made.
    #[error("Quota limit exceeded: {used} of {limit} tokens used")]
    QuotaExceeded {
        /// Tokens already consumed (plus the request's reservation, if any).
        used: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// The deadline elapsed before the provider answered.
    #[error("Request timeout after {}ms", .after.as_millis())]
    Timeout {
        /// Configured deadline.
        after: Duration,
    },

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Provider-side failure (5xx).
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Provider message, with the key redacted.
        message: String,
    },

    /// Unknown model, deployment or resource (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The model cannot honor a requested capability.
    #[error("{capability} is not supported by model {model}")]
    Capability {
        /// Missing capability.
        capability: Capability,
        /// Configured model.
        model: String,
    },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The provider rejected the request shape (other 4xx).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider answered with something we could not parse.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Every provider in the fallback chain failed.
    #[error("all providers failed: {}", summarize(.failures))]
    AllProvidersFailed {
        /// Per-provider errors, in the order they were tried.
        failures: Vec<ProviderFailure>,
    },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {}s)", delay.as_secs()),
        None => String::new(),
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProviderError {
    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a rate limited error.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Auth { .. } => ErrorKind::Auth,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimit,
            ProviderError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            ProviderError::Timeout { .. } => ErrorKind::Timeout,
            ProviderError::Network(_) => ErrorKind::Network,
            ProviderError::Server { .. } => ErrorKind::Server,
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::Capability { .. } => ErrorKind::Capability,
            ProviderError::Cancelled => ErrorKind::Cancelled,
            ProviderError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ProviderError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            ProviderError::AllProvidersFailed { .. } => ErrorKind::AllProvidersFailed,
        }
    }

    /// Returns true if the orchestrator may retry against the same adapter.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Network(_)
                | ProviderError::Server { .. }
        )
    }

    /// Returns true if the manager should move on to the next provider.
    ///
    /// Cancellation ends the chain: the token is shared by every provider in
    /// it, so the next one could only report `Cancelled` again.
    pub fn triggers_fallback(&self) -> bool {
        !matches!(
            self,
            ProviderError::Cancelled | ProviderError::AllProvidersFailed { .. }
        )
    }

    /// Returns true if the failure counts against the provider's health.
    ///
    /// Everything but cancellation counts, including quota and capability
    /// rejections.
    pub fn counts_against_health(&self) -> bool {
        !matches!(
            self,
            ProviderError::Cancelled | ProviderError::AllProvidersFailed { .. }
        )
    }

    /// Returns the provider's retry-after hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// One provider's failure inside a fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    /// Provider that failed.
    pub provider: ProviderId,
    /// Terminal error it reported.
    pub error: ProviderError,
}

impl ProviderFailure {
    /// Creates a failure record.
    pub fn new(provider: ProviderId, error: ProviderError) -> Self {
        Self { provider, error }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}
