//! Single-provider client and the public factory functions.

use std::sync::Arc;

use super::manager::ProviderManager;
use super::orchestrator::RequestOrchestrator;
use super::provider_adapter::ProviderAdapter;
use crate::adapters::HttpTransport;
use crate::config::{OrchestratorConfig, ProviderConfig};
use crate::domain::foundation::ProviderId;
use crate::domain::provider::{
    ChunkStream, ConfigError, ProviderError, Request, Response, RetryPolicy, UsageStats,
};
use crate::ports::Transport;

/// One configured provider with retry, timeout and cancellation applied.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    adapter: Arc<ProviderAdapter>,
    orchestrator: RequestOrchestrator,
}

impl ProviderClient {
    pub fn new(adapter: ProviderAdapter, retry: RetryPolicy) -> Self {
        Self {
            adapter: Arc::new(adapter),
            orchestrator: RequestOrchestrator::new(retry),
        }
    }

    pub async fn send_request(&self, request: &Request) -> Result<Response, ProviderError> {
        self.orchestrator.execute(&self.adapter, request).await
    }

    pub async fn stream_request(&self, request: &Request) -> Result<ChunkStream, ProviderError> {
        self.orchestrator.stream(&self.adapter, request).await
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.adapter.usage_stats()
    }

    pub fn provider_id(&self) -> &ProviderId {
        self.adapter.id()
    }

    pub fn model(&self) -> &str {
        self.adapter.model()
    }

    pub fn endpoint(&self) -> &str {
        self.adapter.endpoint()
    }
}

/// Creates a client that talks HTTP.
pub fn create_provider(config: ProviderConfig) -> Result<ProviderClient, ConfigError> {
    create_provider_with_transport(config, Arc::new(HttpTransport::new()))
}

/// Creates a client over an injected transport.
pub fn create_provider_with_transport(
    config: ProviderConfig,
    transport: Arc<dyn Transport>,
) -> Result<ProviderClient, ConfigError> {
    let adapter = ProviderAdapter::configure(&config, transport)?;
    Ok(ProviderClient::new(adapter, RetryPolicy::default()))
}

/// Creates a manager that talks HTTP.
pub fn create_provider_manager(config: &OrchestratorConfig) -> Result<ProviderManager, ConfigError> {
    create_provider_manager_with_transport(config, Arc::new(HttpTransport::new()))
}

/// Creates a manager over an injected transport.
pub fn create_provider_manager_with_transport(
    config: &OrchestratorConfig,
    transport: Arc<dyn Transport>,
) -> Result<ProviderManager, ConfigError> {
    ProviderManager::from_config(config, transport)
}
