//! Provider manager - selection, fallback and observability across adapters.
//!
//! Healthy adapters are tried in configured order. Degraded adapters follow,
//! least recently failed first, so a fully degraded pool still serves
//! requests. With fallback enabled, a failed attempt moves on to the next
//! adapter until `max_fallback_depth` adapters have been tried.

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::health_monitor::HealthMonitor;
use super::orchestrator::RequestOrchestrator;
use super::provider_adapter::ProviderAdapter;
use crate::config::OrchestratorConfig;
use crate::domain::foundation::ProviderId;
use crate::domain::provider::{
    ChunkStream, ConfigError, HealthPolicy, HealthState, HealthStatus, ProviderError,
    ProviderFailure, Request, Response, RetryPolicy, StreamChunk, UsageStats,
};
use crate::ports::Transport;

/// Manager behaviour knobs.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub enable_fallback: bool,
    /// Maximum adapters tried per request. `None` means all of them.
    pub max_fallback_depth: Option<usize>,
    pub health: HealthPolicy,
    pub retry: RetryPolicy,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            max_fallback_depth: None,
            health: HealthPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ManagerOptions {
    pub fn without_fallback(mut self) -> Self {
        self.enable_fallback = false;
        self
    }

    pub fn with_max_fallback_depth(mut self, depth: usize) -> Self {
        self.max_fallback_depth = Some(depth);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_health(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }
}

/// Adapters in configured order, with the cap on how many are tried.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    adapters: Vec<Arc<ProviderAdapter>>,
    max_depth: usize,
}

impl FallbackChain {
    fn new(adapters: Vec<Arc<ProviderAdapter>>, options: &ManagerOptions) -> Self {
        let max_depth = if options.enable_fallback {
            options
                .max_fallback_depth
                .unwrap_or(adapters.len())
                .clamp(1, adapters.len().max(1))
        } else {
            1
        };
        Self {
            adapters,
            max_depth,
        }
    }

    pub fn adapters(&self) -> &[Arc<ProviderAdapter>] {
        &self.adapters
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Usage figures for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub provider: ProviderId,
    #[serde(flatten)]
    pub stats: UsageStats,
}

/// Owns the adapter pool and routes requests across it.
#[derive(Debug)]
pub struct ProviderManager {
    chain: FallbackChain,
    enable_fallback: bool,
    monitor: HealthMonitor,
    orchestrator: RequestOrchestrator,
}

impl ProviderManager {
    /// Creates a manager over already configured adapters.
    ///
    /// Fails with `NoProviders` for an empty pool and `DuplicateProvider` if
    /// two adapters share an id.
    pub fn new(
        adapters: Vec<ProviderAdapter>,
        options: ManagerOptions,
    ) -> Result<Self, ConfigError> {
        if adapters.is_empty() {
            return Err(ConfigError::NoProviders);
        }

        let mut seen = HashSet::new();
        for adapter in &adapters {
            if !seen.insert(adapter.id().clone()) {
                return Err(ConfigError::DuplicateProvider(adapter.id().clone()));
            }
        }

        let adapters = adapters.into_iter().map(Arc::new).collect();
        Ok(Self {
            chain: FallbackChain::new(adapters, &options),
            enable_fallback: options.enable_fallback,
            monitor: HealthMonitor::new(options.health),
            orchestrator: RequestOrchestrator::new(options.retry),
        })
    }

    /// Validates `config`, then configures every provider over the given
    /// transport.
    pub fn from_config(
        config: &OrchestratorConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let adapters = config
            .providers
            .iter()
            .map(|provider| ProviderAdapter::configure(provider, transport.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let options = ManagerOptions {
            enable_fallback: config.enable_fallback,
            max_fallback_depth: config.max_fallback_depth,
            health: config.health.policy(),
            retry: config.retry.policy(),
        };
        Self::new(adapters, options)
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.chain.adapters.iter().map(|a| a.id().clone()).collect()
    }

    /// Adapters in the order they would be tried right now.
    fn ordered(&self) -> Vec<Arc<ProviderAdapter>> {
        let mut healthy = Vec::new();
        let mut degraded = Vec::new();
        for adapter in &self.chain.adapters {
            match self.monitor.state(adapter) {
                HealthState::Healthy => healthy.push(adapter.clone()),
                HealthState::Degraded => degraded.push(adapter.clone()),
            }
        }

        // Stable sort keeps configured order among equal timestamps.
        degraded.sort_by_key(|adapter| self.monitor.health(adapter).last_failure_at);
        healthy.extend(degraded);
        healthy
    }

    /// The adapter the next request would go to.
    ///
    /// The first healthy adapter in configured order, else the least recently
    /// failed degraded one. Has no side effects.
    pub fn select_provider(&self) -> Arc<ProviderAdapter> {
        // The pool is never empty.
        self.ordered().remove(0)
    }

    /// Sends to the selected provider only.
    pub async fn send_request(&self, request: &Request) -> Result<Response, ProviderError> {
        let adapter = self.select_provider();
        let outcome = self.orchestrator.execute(&adapter, request).await;
        self.record(&adapter, &outcome);
        outcome
    }

    /// Sends along the fallback chain until one provider succeeds.
    pub async fn send_with_fallback(&self, request: &Request) -> Result<Response, ProviderError> {
        let mut failures = Vec::new();

        for adapter in self.ordered().into_iter().take(self.chain.max_depth) {
            let outcome = self.orchestrator.execute(&adapter, request).await;
            self.record(&adapter, &outcome);

            match outcome {
                Ok(response) => {
                    if !failures.is_empty() {
                        debug!(
                            provider = %adapter.id(),
                            request_id = %request.id,
                            attempts = failures.len() + 1,
                            "request served by fallback provider"
                        );
                    }
                    return Ok(response);
                }
                Err(error) => {
                    if !error.triggers_fallback() {
                        return Err(error);
                    }
                    warn!(
                        provider = %adapter.id(),
                        request_id = %request.id,
                        error = %error,
                        "provider failed, falling back"
                    );
                    failures.push(ProviderFailure::new(adapter.id().clone(), error));
                }
            }
        }

        Err(self.exhausted(failures))
    }

    /// Streams along the fallback chain.
    ///
    /// Fallback happens only until the first chunk is produced. After that a
    /// failure ends the stream with the provider's error.
    pub async fn stream_with_fallback(
        &self,
        request: &Request,
    ) -> Result<ChunkStream, ProviderError> {
        let mut failures = Vec::new();

        for adapter in self.ordered().into_iter().take(self.chain.max_depth) {
            let error = match self.orchestrator.stream(&adapter, request).await {
                Ok(mut chunks) => match chunks.next().await {
                    Some(Ok(first)) => {
                        return Ok(ChunkStream::new(self.observe(adapter, first, chunks)));
                    }
                    Some(Err(error)) => error,
                    None => ProviderError::network("stream ended before completion"),
                },
                Err(error) => error,
            };

            self.monitor.record_failure(&adapter, &error);
            if !error.triggers_fallback() {
                return Err(error);
            }
            warn!(
                provider = %adapter.id(),
                request_id = %request.id,
                error = %error,
                "stream failed before first chunk, falling back"
            );
            failures.push(ProviderFailure::new(adapter.id().clone(), error));
        }

        Err(self.exhausted(failures))
    }

    /// Feeds the outcome of an already started stream to the health monitor.
    fn observe(
        &self,
        adapter: Arc<ProviderAdapter>,
        first: StreamChunk,
        mut rest: ChunkStream,
    ) -> impl Stream<Item = Result<StreamChunk, ProviderError>> + Send + 'static {
        let monitor = self.monitor.clone();
        async_stream::stream! {
            let mut item = Some(Ok(first));
            while let Some(next) = item {
                match &next {
                    Ok(chunk) if chunk.is_final => monitor.record_success(&adapter),
                    Ok(_) => {}
                    Err(error) => monitor.record_failure(&adapter, error),
                }
                let terminal = !matches!(&next, Ok(chunk) if !chunk.is_final);
                yield next;
                if terminal {
                    return;
                }
                item = rest.next().await;
            }
        }
    }

    fn record<T>(&self, adapter: &ProviderAdapter, outcome: &Result<T, ProviderError>) {
        match outcome {
            Ok(_) => self.monitor.record_success(adapter),
            Err(error) => self.monitor.record_failure(adapter, error),
        }
    }

    fn exhausted(&self, mut failures: Vec<ProviderFailure>) -> ProviderError {
        if !self.enable_fallback && failures.len() == 1 {
            return failures.remove(0).error;
        }
        ProviderError::AllProvidersFailed { failures }
    }

    fn find(&self, id: &str) -> Option<&Arc<ProviderAdapter>> {
        self.chain.adapters.iter().find(|adapter| adapter.id() == id)
    }

    fn find_or_not_found(&self, id: &str) -> Result<&Arc<ProviderAdapter>, ProviderError> {
        self.find(id)
            .ok_or_else(|| ProviderError::NotFound(format!("unknown provider: {id}")))
    }

    /// Health snapshot for one provider.
    pub fn get_provider_health(&self, id: &str) -> Option<HealthStatus> {
        self.find(id).map(|adapter| self.monitor.health(adapter))
    }

    /// Health snapshots in configured order.
    pub fn all_health(&self) -> Vec<HealthStatus> {
        self.chain
            .adapters
            .iter()
            .map(|adapter| self.monitor.health(adapter))
            .collect()
    }

    /// Usage figures in configured order.
    pub fn get_usage_stats(&self) -> Vec<ProviderUsage> {
        self.chain
            .adapters
            .iter()
            .map(|adapter| ProviderUsage {
                provider: adapter.id().clone(),
                stats: adapter.usage_stats(),
            })
            .collect()
    }

    /// Usage figures for one provider.
    pub fn usage_stats(&self, id: &str) -> Option<UsageStats> {
        self.find(id).map(|adapter| adapter.usage_stats())
    }

    /// Forces a provider out of rotation until its next recorded outcome.
    pub fn mark_provider_degraded(&self, id: &str) -> Result<(), ProviderError> {
        let adapter = self.find_or_not_found(id)?;
        self.monitor.mark_degraded(adapter);
        Ok(())
    }

    /// Puts a provider back into rotation.
    pub fn mark_provider_healthy(&self, id: &str) -> Result<(), ProviderError> {
        let adapter = self.find_or_not_found(id)?;
        self.monitor.mark_healthy(adapter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockReply, MockTransport};
    use crate::config::ProviderConfig;
    use crate::domain::provider::ImageInput;

    fn adapter(config: ProviderConfig, transport: &MockTransport) -> ProviderAdapter {
        ProviderAdapter::configure(&config.with_max_retries(0), Arc::new(transport.clone()))
            .unwrap()
    }

    fn pair(
        primary: &MockTransport,
        secondary: &MockTransport,
        options: ManagerOptions,
    ) -> ProviderManager {
        ProviderManager::new(
            vec![
                adapter(ProviderConfig::openai("sk-openai", "gpt-4"), primary),
                adapter(
                    ProviderConfig::claude("sk-ant", "claude-3-5-sonnet-20241022"),
                    secondary,
                ),
            ],
            options,
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_pool() {
        let err = ProviderManager::new(Vec::new(), ManagerOptions::default()).unwrap_err();
        assert_eq!(err, ConfigError::NoProviders);
    }

    #[test]
    fn rejects_duplicate_providers() {
        let transport = MockTransport::new();
        let err = ProviderManager::new(
            vec![
                adapter(ProviderConfig::openai("sk-a", "gpt-4"), &transport),
                adapter(ProviderConfig::openai("sk-b", "gpt-4o"), &transport),
            ],
            ManagerOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateProvider(ProviderId::new("openai")));
    }

    #[test]
    fn depth_is_one_without_fallback() {
        let transport = MockTransport::new();
        let manager = pair(&transport, &transport, ManagerOptions::default().without_fallback());
        assert_eq!(manager.chain().max_depth(), 1);

        let manager = pair(&transport, &transport, ManagerOptions::default());
        assert_eq!(manager.chain().max_depth(), 2);
    }

    #[test]
    fn selects_first_healthy_provider() {
        let transport = MockTransport::new();
        let manager = pair(&transport, &transport, ManagerOptions::default());

        assert_eq!(manager.select_provider().id(), "openai");
        assert_eq!(manager.select_provider().id(), "openai");

        manager.mark_provider_degraded("openai").unwrap();
        assert_eq!(manager.select_provider().id(), "claude");
    }

    #[test]
    fn least_recently_failed_wins_when_all_degraded() {
        let transport = MockTransport::new();
        let manager = pair(&transport, &transport, ManagerOptions::default());

        manager.mark_provider_degraded("claude").unwrap();
        manager.mark_provider_degraded("openai").unwrap();

        // Neither has failed yet, so configured order decides.
        assert_eq!(manager.select_provider().id(), "openai");
    }

    #[tokio::test]
    async fn falls_back_on_auth_failure() {
        let primary = MockTransport::new().with_reply(MockReply::error_status(401, "bad key"));
        let secondary = MockTransport::new().with_reply(MockReply::anthropic_text("hi", 3, 4));
        let manager = pair(&primary, &secondary, ManagerOptions::default());

        let response = manager.send_with_fallback(&Request::new("hello")).await.unwrap();

        assert_eq!(response.provider, "claude");
        assert_eq!(manager.get_provider_health("openai").unwrap().failure_count, 1);
        assert_eq!(manager.get_provider_health("claude").unwrap().failure_count, 0);
    }

    #[tokio::test]
    async fn exhausted_chain_lists_every_failure() {
        let primary = MockTransport::new().with_reply(MockReply::error_status(401, "bad key"));
        let secondary = MockTransport::new().with_reply(MockReply::error_status(404, "no model"));
        let manager = pair(&primary, &secondary, ManagerOptions::default());

        let err = manager.send_with_fallback(&Request::new("hello")).await.unwrap_err();

        match err {
            ProviderError::AllProvidersFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].provider, "openai");
                assert!(matches!(failures[0].error, ProviderError::Auth { .. }));
                assert_eq!(failures[1].provider, "claude");
                assert!(matches!(failures[1].error, ProviderError::NotFound(_)));
            }
            other => panic!("expected AllProvidersFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn without_fallback_returns_error_unwrapped() {
        let primary = MockTransport::new().with_reply(MockReply::error_status(401, "bad key"));
        let secondary = MockTransport::new();
        let manager = pair(&primary, &secondary, ManagerOptions::default().without_fallback());

        let err = manager.send_with_fallback(&Request::new("hello")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Auth { .. }));
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_ends_the_chain() {
        let primary = MockTransport::new();
        let secondary = MockTransport::new();
        let manager = pair(&primary, &secondary, ManagerOptions::default());
        let request = Request::new("hello");
        request.cancellation().cancel();

        let err = manager.send_with_fallback(&request).await.unwrap_err();

        assert_eq!(err, ProviderError::Cancelled);
        assert_eq!(primary.call_count() + secondary.call_count(), 0);
        assert_eq!(manager.get_provider_health("openai").unwrap().failure_count, 0);
    }

    #[tokio::test]
    async fn capability_gap_counts_and_falls_back() {
        let primary = MockTransport::new();
        let secondary =
            MockTransport::new().with_reply(MockReply::anthropic_text("a cat", 4, 2));
        let manager = pair(&primary, &secondary, ManagerOptions::default());
        let request = Request::new("describe").with_image(ImageInput::png("aGVsbG8="));

        let response = manager.send_with_fallback(&request).await.unwrap();

        assert_eq!(response.provider, "claude");
        assert_eq!(primary.call_count(), 0);
        assert_eq!(manager.get_provider_health("openai").unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn send_request_uses_selected_provider_only() {
        let primary = MockTransport::new().with_reply(MockReply::error_status(500, "down"));
        let secondary = MockTransport::new();
        let manager = pair(&primary, &secondary, ManagerOptions::default());

        let err = manager.send_request(&Request::new("hello")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Server { status: 500, .. }));
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn stream_falls_back_before_first_chunk() {
        let primary = MockTransport::new().with_reply(MockReply::error_status(503, "overloaded"));
        let secondary =
            MockTransport::new().with_reply(MockReply::anthropic_stream(&["Hel", "lo"], 2, 3));
        let manager = pair(&primary, &secondary, ManagerOptions::default());

        let chunks: Vec<_> = manager
            .stream_with_fallback(&Request::new("hi").streaming())
            .await
            .unwrap()
            .collect()
            .await;

        let text: String = chunks
            .iter()
            .map(|chunk| chunk.as_ref().unwrap().text.as_str())
            .collect();
        assert_eq!(text, "Hello");
        assert!(chunks.last().unwrap().as_ref().unwrap().is_final);
        assert_eq!(manager.get_provider_health("openai").unwrap().failure_count, 1);
    }

    #[test]
    fn unknown_provider_is_not_found() {
        let transport = MockTransport::new();
        let manager = pair(&transport, &transport, ManagerOptions::default());

        assert!(manager.get_provider_health("gemini").is_none());
        assert!(manager.usage_stats("gemini").is_none());
        assert!(matches!(
            manager.mark_provider_healthy("gemini"),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn usage_stats_serialize_flat() {
        let transport = MockTransport::new();
        let manager = pair(&transport, &transport, ManagerOptions::default());

        let json = serde_json::to_value(manager.get_usage_stats()).unwrap();

        assert_eq!(json[0]["provider"], "openai");
        assert_eq!(json[0]["request_count"], 0);
        assert_eq!(json[1]["provider"], "claude");
    }
}
