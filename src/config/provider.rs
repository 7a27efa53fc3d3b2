//! Per-provider configuration
//!
//! One tagged variant per backend. Each variant only carries the fields that
//! backend accepts, so an Azure config without a deployment cannot be built.

use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::provider::ProviderKind;

/// Configuration for one provider adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAi(HostedConfig),
    Claude(HostedConfig),
    Gemini(HostedConfig),
    Azure(AzureConfig),
    DeepSeek(HostedConfig),
    Moonshot(HostedConfig),
}

/// Settings for providers with a well-known public endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HostedConfig {
    /// API key; absence is reported when the adapter is built
    #[serde(default)]
    pub api_key: Option<Secret<String>>,

    /// Environment variable to read the key from when `api_key` is absent
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Model name, checked against the provider's catalog
    pub model: String,

    /// Override for the provider's default base URL
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(flatten)]
    pub limits: ProviderLimits,
}

/// Settings for an Azure OpenAI deployment
#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    #[serde(default)]
    pub api_key: Option<Secret<String>>,

    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Underlying OpenAI model served by the deployment
    pub model: String,

    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,

    /// Deployment name
    pub deployment: String,

    /// API version query parameter
    pub api_version: String,

    #[serde(flatten)]
    pub limits: ProviderLimits,
}

/// Limits shared by every provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderLimits {
    /// Per-call deadline in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Additional attempts on transient errors
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Requests admitted per one-minute window
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    /// Cumulative token ceiling
    #[serde(default)]
    pub quota_limit_tokens: Option<u64>,
}

impl ProviderLimits {
    /// Per-call deadline (default 30s)
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or_else(default_timeout_ms))
    }

    /// Additional attempts on transient errors (default 3)
    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or_else(default_max_retries)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

impl HostedConfig {
    fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: Some(Secret::new(api_key.into())),
            api_key_env: None,
            model: model.into(),
            endpoint: None,
            limits: ProviderLimits::default(),
        }
    }
}

impl ProviderConfig {
    /// OpenAI chat completions
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::OpenAi(HostedConfig::new(api_key, model))
    }

    /// Anthropic Claude messages
    pub fn claude(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::Claude(HostedConfig::new(api_key, model))
    }

    /// Google Gemini
    pub fn gemini(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::Gemini(HostedConfig::new(api_key, model))
    }

    /// DeepSeek
    pub fn deepseek(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::DeepSeek(HostedConfig::new(api_key, model))
    }

    /// Moonshot
    pub fn moonshot(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::Moonshot(HostedConfig::new(api_key, model))
    }

    /// Azure OpenAI deployment
    pub fn azure(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::Azure(AzureConfig {
            api_key: Some(Secret::new(api_key.into())),
            api_key_env: None,
            model: model.into(),
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_version: api_version.into(),
            limits: ProviderLimits::default(),
        })
    }

    /// Which backend this config targets
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::OpenAi(_) => ProviderKind::OpenAi,
            ProviderConfig::Claude(_) => ProviderKind::Claude,
            ProviderConfig::Gemini(_) => ProviderKind::Gemini,
            ProviderConfig::Azure(_) => ProviderKind::Azure,
            ProviderConfig::DeepSeek(_) => ProviderKind::DeepSeek,
            ProviderConfig::Moonshot(_) => ProviderKind::Moonshot,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::Azure(azure) => &azure.model,
            ProviderConfig::OpenAi(hosted)
            | ProviderConfig::Claude(hosted)
            | ProviderConfig::Gemini(hosted)
            | ProviderConfig::DeepSeek(hosted)
            | ProviderConfig::Moonshot(hosted) => &hosted.model,
        }
    }

    pub fn limits(&self) -> &ProviderLimits {
        match self {
            ProviderConfig::Azure(azure) => &azure.limits,
            ProviderConfig::OpenAi(hosted)
            | ProviderConfig::Claude(hosted)
            | ProviderConfig::Gemini(hosted)
            | ProviderConfig::DeepSeek(hosted)
            | ProviderConfig::Moonshot(hosted) => &hosted.limits,
        }
    }

    fn limits_mut(&mut self) -> &mut ProviderLimits {
        match self {
            ProviderConfig::Azure(azure) => &mut azure.limits,
            ProviderConfig::OpenAi(hosted)
            | ProviderConfig::Claude(hosted)
            | ProviderConfig::Gemini(hosted)
            | ProviderConfig::DeepSeek(hosted)
            | ProviderConfig::Moonshot(hosted) => &mut hosted.limits,
        }
    }

    /// Configured endpoint, falling back to the provider's default
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::Azure(azure) => Some(&azure.endpoint),
            ProviderConfig::OpenAi(hosted)
            | ProviderConfig::Claude(hosted)
            | ProviderConfig::Gemini(hosted)
            | ProviderConfig::DeepSeek(hosted)
            | ProviderConfig::Moonshot(hosted) => hosted
                .endpoint
                .as_deref()
                .or_else(|| self.kind().default_endpoint()),
        }
    }

    /// The endpoint, if it is an absolute http(s) URL with a host
    pub fn http_endpoint(&self) -> Option<&str> {
        self.endpoint().filter(|endpoint| {
            reqwest::Url::parse(endpoint).is_ok_and(|url| {
                matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
            })
        })
    }

    /// Resolves the API key, reading `api_key_env` when no key is inline
    ///
    /// Empty keys resolve to `None`.
    pub fn api_key(&self) -> Option<Secret<String>> {
        use secrecy::ExposeSecret;

        let (inline, env_name) = match self {
            ProviderConfig::Azure(azure) => (&azure.api_key, &azure.api_key_env),
            ProviderConfig::OpenAi(hosted)
            | ProviderConfig::Claude(hosted)
            | ProviderConfig::Gemini(hosted)
            | ProviderConfig::DeepSeek(hosted)
            | ProviderConfig::Moonshot(hosted) => (&hosted.api_key, &hosted.api_key_env),
        };

        let key = match inline {
            Some(key) => Some(key.clone()),
            None => env_name
                .as_ref()
                .and_then(|name| std::env::var(name).ok())
                .map(Secret::new),
        };

        key.filter(|key| !key.expose_secret().trim().is_empty())
    }

    /// Sets the endpoint (ignored for Azure, whose endpoint is mandatory)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        match &mut self {
            ProviderConfig::Azure(azure) => azure.endpoint = endpoint.into(),
            ProviderConfig::OpenAi(hosted)
            | ProviderConfig::Claude(hosted)
            | ProviderConfig::Gemini(hosted)
            | ProviderConfig::DeepSeek(hosted)
            | ProviderConfig::Moonshot(hosted) => hosted.endpoint = Some(endpoint.into()),
        }
        self
    }

    /// Drops the API key
    pub fn without_api_key(mut self) -> Self {
        match &mut self {
            ProviderConfig::Azure(azure) => azure.api_key = None,
            ProviderConfig::OpenAi(hosted)
            | ProviderConfig::Claude(hosted)
            | ProviderConfig::Gemini(hosted)
            | ProviderConfig::DeepSeek(hosted)
            | ProviderConfig::Moonshot(hosted) => hosted.api_key = None,
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits_mut().timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.limits_mut().max_retries = Some(max_retries);
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.limits_mut().requests_per_minute = Some(rpm);
        self
    }

    pub fn with_quota_limit(mut self, tokens: u64) -> Self {
        self.limits_mut().quota_limit_tokens = Some(tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_http_endpoint_requires_scheme_and_host() {
        let ok = ProviderConfig::openai("sk", "gpt-4").with_endpoint("http://localhost:8080/v1");
        assert_eq!(ok.http_endpoint(), Some("http://localhost:8080/v1"));

        for bad in ["ftp://example.com", "https://", "api.openai.com", "https://exa mple.com"] {
            let config = ProviderConfig::openai("sk", "gpt-4").with_endpoint(bad);
            assert_eq!(config.http_endpoint(), None, "{bad}");
        }
    }

    #[test]
    fn test_limits_defaults() {
        let config = ProviderConfig::openai("sk-xxx", "gpt-4");
        assert_eq!(config.limits().timeout(), Duration::from_secs(30));
        assert_eq!(config.limits().max_retries(), 3);
        assert_eq!(config.limits().requests_per_minute, None);
        assert_eq!(config.limits().quota_limit_tokens, None);
    }

    #[test]
    fn test_builder_sets_limits() {
        let config = ProviderConfig::claude("sk-ant-xxx", "claude-3-opus")
            .with_timeout(Duration::from_millis(1000))
            .with_max_retries(0)
            .with_requests_per_minute(2)
            .with_quota_limit(1000);

        assert_eq!(config.limits().timeout_ms, Some(1000));
        assert_eq!(config.limits().max_retries(), 0);
        assert_eq!(config.limits().requests_per_minute, Some(2));
        assert_eq!(config.limits().quota_limit_tokens, Some(1000));
        assert_eq!(config.kind(), ProviderKind::Claude);
    }

    #[test]
    fn test_endpoint_defaults_per_kind() {
        let openai = ProviderConfig::openai("sk-xxx", "gpt-4");
        assert_eq!(openai.endpoint(), Some("https://api.openai.com"));

        let custom = openai.with_endpoint("http://localhost:8080");
        assert_eq!(custom.endpoint(), Some("http://localhost:8080"));

        let azure = ProviderConfig::azure(
            "key",
            "https://res.openai.azure.com",
            "gpt4-prod",
            "2024-02-01",
            "gpt-4",
        );
        assert_eq!(azure.endpoint(), Some("https://res.openai.azure.com"));
    }

    #[test]
    fn test_empty_api_key_resolves_to_none() {
        assert!(ProviderConfig::openai("", "gpt-4").api_key().is_none());
        assert!(ProviderConfig::openai("   ", "gpt-4").api_key().is_none());
        assert!(ProviderConfig::openai("sk", "gpt-4").without_api_key().api_key().is_none());
    }

    #[test]
    fn test_deserialize_tagged_variants() {
        let json = serde_json::json!({
            "provider": "deepseek",
            "api_key": "sk-ds",
            "model": "deepseek-chat",
            "requests_per_minute": 10
        });
        let config: ProviderConfig = serde_json::from_value(json).unwrap();

        assert_eq!(config.kind(), ProviderKind::DeepSeek);
        assert_eq!(config.limits().requests_per_minute, Some(10));
        assert_eq!(config.api_key().unwrap().expose_secret(), "sk-ds");
    }

    #[test]
    fn test_azure_requires_deployment() {
        let json = serde_json::json!({
            "provider": "azure",
            "api_key": "key",
            "model": "gpt-4",
            "endpoint": "https://res.openai.azure.com",
            "api_version": "2024-02-01"
        });
        assert!(serde_json::from_value::<ProviderConfig>(json).is_err());
    }

    #[test]
    fn test_debug_output_redacts_key() {
        let config = ProviderConfig::openai("sk-super-secret", "gpt-4");
        assert!(!format!("{config:?}").contains("sk-super-secret"));
    }
}
