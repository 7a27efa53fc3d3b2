//! Provider adapter - one configured vendor behind the uniform contract.
//!
//! An adapter owns the codec for its wire format, a transport, its usage
//! tracker and its health record. It performs exactly one network attempt per
//! call; retries, timeouts and cancellation belong to the orchestrator.

use async_stream::stream;
use futures::StreamExt;
use secrecy::Secret;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::adapters::codecs::{codec_for, error_for_status, redact};
use crate::config::ProviderConfig;
use crate::domain::foundation::ProviderId;
use crate::domain::provider::{
    estimate_tokens, Capabilities, ChunkStream, ConfigError, HealthRecord, ProviderError,
    ProviderKind, Request, Response, StreamChunk, UsageStats,
};
use crate::ports::{ProviderCodec, StreamEvent, Transport, WireBody};

use super::usage_tracker::UsageTracker;

/// A configured provider.
pub struct ProviderAdapter {
    id: ProviderId,
    kind: ProviderKind,
    model: String,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
    capabilities: Capabilities,
    codec: Arc<dyn ProviderCodec>,
    transport: Arc<dyn Transport>,
    api_key: Secret<String>,
    usage: Arc<UsageTracker>,
    health: Mutex<HealthRecord>,
}

impl ProviderAdapter {
    /// Validates the configuration and builds the adapter.
    ///
    /// Fails with `MissingApiKey`, `UnsupportedModel`, `InvalidEndpoint` or
    /// `ZeroLimit`, checked in that order. Never touches the network.
    pub fn configure(
        config: &ProviderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let kind = config.kind();
        let api_key = config
            .api_key()
            .ok_or(ConfigError::MissingApiKey { provider: kind })?;

        let model = config.model();
        if !kind.supports_model(model) {
            return Err(ConfigError::unsupported_model(kind, model));
        }

        let codec: Arc<dyn ProviderCodec> = codec_for(config, api_key.clone())?.into();
        let id = kind.provider_id();
        let limits = config.limits();
        if limits.timeout_ms == Some(0) {
            return Err(ConfigError::ZeroLimit {
                provider: kind,
                setting: "timeout_ms",
            });
        }
        if limits.requests_per_minute == Some(0) {
            return Err(ConfigError::ZeroLimit {
                provider: kind,
                setting: "requests_per_minute",
            });
        }
        let usage = UsageTracker::new(id.clone())
            .with_quota_limit(limits.quota_limit_tokens)
            .with_requests_per_minute(limits.requests_per_minute);

        Ok(Self {
            id,
            kind,
            model: model.to_string(),
            endpoint: config.endpoint().unwrap_or_default().to_string(),
            timeout: limits.timeout(),
            max_retries: limits.max_retries(),
            capabilities: kind.capabilities(model),
            codec,
            transport,
            api_key,
            usage: Arc::new(usage),
            health: Mutex::new(HealthRecord::new()),
        })
    }

    pub fn id(&self) -> &ProviderId {
        &self.id
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.usage.stats()
    }

    /// Fails with `Capability` if the request needs something the model lacks.
    pub fn check_capabilities(&self, request: &Request) -> Result<(), ProviderError> {
        match request
            .required_capabilities()
            .into_iter()
            .find(|capability| !self.capabilities.supports(*capability))
        {
            Some(capability) => Err(ProviderError::Capability {
                capability,
                model: self.model.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Runs `f` against the health record.
    pub(crate) fn with_health<R>(&self, f: impl FnOnce(&mut HealthRecord) -> R) -> R {
        let mut record = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut record)
    }

    /// One non-streaming attempt.
    pub async fn send(&self, request: &Request) -> Result<Response, ProviderError> {
        let outcome = self.send_once(request).await;
        match &outcome {
            Ok(response) => self.usage.record_success(response.tokens_used),
            Err(_) => self.usage.record_failure(),
        }
        outcome
    }

    async fn send_once(&self, request: &Request) -> Result<Response, ProviderError> {
        let wire = self.codec.build_request(request, false);
        debug!(provider = %self.id, request_id = %request.id, url = %wire.url, "sending request");

        let reply = self.transport.execute(wire).await?;
        if !reply.is_success() {
            return Err(error_for_status(
                reply.status,
                reply.retry_after,
                &reply.body,
                &self.api_key,
            ));
        }

        let parsed = self.codec.parse_response(&reply.body)?;
        let tokens_used = match parsed.usage {
            Some(usage) => usage.total(),
            None => estimate_tokens(&request.prompt).saturating_add(estimate_tokens(&parsed.text)),
        };

        Ok(Response {
            text: parsed.text,
            tokens_used,
            function_call: parsed.function_call,
            provider: self.id.clone(),
            model: self.model.clone(),
            images_processed: request.images.len(),
            raw: Some(parsed.raw),
        })
    }

    /// Opens a stream. One attempt; the open itself is not retried here.
    ///
    /// Usage is recorded when the stream completes, fails or ends early.
    pub async fn stream(&self, request: &Request) -> Result<ChunkStream, ProviderError> {
        match self.open_stream(request).await {
            Ok(chunks) => Ok(chunks),
            Err(error) => {
                self.usage.record_failure();
                Err(error)
            }
        }
    }

    async fn open_stream(&self, request: &Request) -> Result<ChunkStream, ProviderError> {
        let wire = self.codec.build_request(request, true);
        debug!(provider = %self.id, request_id = %request.id, url = %wire.url, "opening stream");

        let reply = self.transport.open_stream(wire).await?;
        let succeeded = reply.is_success();
        let mut events = match reply.body {
            WireBody::Complete(body) if !succeeded => {
                return Err(error_for_status(
                    reply.status,
                    reply.retry_after,
                    &body,
                    &self.api_key,
                ))
            }
            WireBody::Complete(body) => futures::stream::iter(vec![Ok(body)]).boxed(),
            WireBody::Events(events) if !succeeded => {
                let body = collect_body(events).await;
                return Err(error_for_status(
                    reply.status,
                    reply.retry_after,
                    &body,
                    &self.api_key,
                ));
            }
            WireBody::Events(events) => events,
        };

        let codec = self.codec.clone();
        let usage = self.usage.clone();
        let api_key = self.api_key.clone();
        let prompt_estimate = estimate_tokens(&request.prompt);

        let chunks = stream! {
            let mut input: Option<u32> = None;
            let mut output: Option<u32> = None;
            let mut text_estimate = 0u32;

            while let Some(data) = events.next().await {
                let decoded = data.and_then(|data| codec.parse_event(&data));
                let decoded = match decoded {
                    Ok(decoded) => decoded,
                    Err(error) => {
                        usage.record_failure();
                        yield Err(scrub(error, &api_key));
                        return;
                    }
                };

                for event in decoded {
                    match event {
                        StreamEvent::Text(text) => {
                            if text.is_empty() {
                                continue;
                            }
                            text_estimate = text_estimate.saturating_add(estimate_tokens(&text));
                            yield Ok(StreamChunk::content(text));
                        }
                        StreamEvent::Usage { input: i, output: o } => {
                            input = i.or(input);
                            output = o.or(output);
                        }
                        StreamEvent::Done => {
                            let tokens = match (input, output) {
                                (None, None) => prompt_estimate.saturating_add(text_estimate),
                                (i, o) => i.unwrap_or(0).saturating_add(o.unwrap_or(0)),
                            };
                            usage.record_success(tokens);
                            yield Ok(StreamChunk::final_chunk(tokens));
                            return;
                        }
                        StreamEvent::Failed(error) => {
                            usage.record_failure();
                            yield Err(scrub(error, &api_key));
                            return;
                        }
                    }
                }
            }

            // The transport ended without a terminal event.
            usage.record_failure();
        };

        Ok(ChunkStream::new(chunks))
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

async fn collect_body(
    mut events: futures::stream::BoxStream<'static, Result<String, ProviderError>>,
) -> String {
    let mut body = String::new();
    while let Some(Ok(data)) = events.next().await {
        body.push_str(&data);
    }
    body
}

fn scrub(error: ProviderError, api_key: &Secret<String>) -> ProviderError {
    match error {
        ProviderError::Server { status, message } => ProviderError::Server {
            status,
            message: redact(&message, api_key),
        },
        ProviderError::Network(message) => ProviderError::Network(redact(&message, api_key)),
        ProviderError::InvalidResponse(message) => {
            ProviderError::InvalidResponse(redact(&message, api_key))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockEvent, MockReply, MockTransport};
    use crate::domain::provider::{Capability, FunctionDefinition, ImageInput};
    use futures::StreamExt;
    use serde_json::json;

    fn adapter(config: ProviderConfig, transport: &MockTransport) -> ProviderAdapter {
        ProviderAdapter::configure(&config, Arc::new(transport.clone())).unwrap()
    }

    #[test]
    fn configure_rejects_missing_key_before_model() {
        let config = ProviderConfig::openai("", "not-a-model");
        let err = ProviderAdapter::configure(&config, Arc::new(MockTransport::new())).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingApiKey {
                provider: ProviderKind::OpenAi
            }
        );
        assert_eq!(err.to_string(), "API key is required for provider openai");
    }

    #[test]
    fn configure_rejects_unknown_model() {
        let config = ProviderConfig::claude("sk-ant", "gpt-4");
        let err = ProviderAdapter::configure(&config, Arc::new(MockTransport::new())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Model not supported by provider claude: gpt-4"
        );
    }

    #[test]
    fn configure_rejects_bad_endpoint() {
        let config = ProviderConfig::openai("sk-test", "gpt-4").with_endpoint("ftp://example.com");
        let err = ProviderAdapter::configure(&config, Arc::new(MockTransport::new())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn configure_rejects_zero_limits() {
        let config = ProviderConfig::openai("sk-test", "gpt-4").with_requests_per_minute(0);
        let err = ProviderAdapter::configure(&config, Arc::new(MockTransport::new())).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ZeroLimit {
                provider: ProviderKind::OpenAi,
                setting: "requests_per_minute",
            }
        );

        let config = ProviderConfig::openai("sk-test", "gpt-4").with_timeout(Duration::ZERO);
        let err = ProviderAdapter::configure(&config, Arc::new(MockTransport::new())).unwrap_err();
        assert_eq!(err.to_string(), "timeout_ms must be greater than zero for provider openai");
    }

    #[test]
    fn configure_exposes_settings() {
        let config = ProviderConfig::openai("sk-test", "gpt-4")
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1);
        let adapter = adapter(config, &MockTransport::new());

        assert_eq!(adapter.id(), "openai");
        assert_eq!(adapter.model(), "gpt-4");
        assert_eq!(adapter.endpoint(), "https://api.openai.com");
        assert_eq!(adapter.timeout(), Duration::from_secs(5));
        assert_eq!(adapter.max_retries(), 1);
        assert!(!format!("{adapter:?}").contains("sk-test"));
    }

    #[tokio::test]
    async fn send_maps_reply_and_records_usage() {
        let transport =
            MockTransport::new().with_reply(MockReply::openai_text("你好", 12));
        let adapter = adapter(ProviderConfig::openai("sk-test", "gpt-4"), &transport);

        let response = adapter
            .send(&Request::new("Translate to Chinese: Hello"))
            .await
            .unwrap();

        assert_eq!(response.text, "你好");
        assert_eq!(response.provider, "openai");
        assert_eq!(response.tokens_used, 12);
        assert!(response.raw.is_some());
        assert_eq!(adapter.usage_stats().total_tokens, 12);
        assert_eq!(adapter.usage_stats().request_count, 1);
    }

    #[tokio::test]
    async fn send_estimates_tokens_when_unreported() {
        let transport = MockTransport::new().with_reply(MockReply::ok(json!({
            "choices": [{"message": {"role": "assistant", "content": "abcdefgh"}}]
        })));
        let adapter = adapter(ProviderConfig::openai("sk-test", "gpt-4"), &transport);

        let response = adapter.send(&Request::new("abcd")).await.unwrap();

        assert_eq!(response.tokens_used, 3);
    }

    #[tokio::test]
    async fn send_maps_auth_failure_and_redacts_key() {
        let transport = MockTransport::new().with_reply(MockReply::error_status(
            401,
            "Incorrect API key provided: sk-secret-123",
        ));
        let adapter = adapter(ProviderConfig::openai("sk-secret-123", "gpt-4"), &transport);

        let err = adapter.send(&Request::new("hi")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Auth { .. }));
        assert!(err.to_string().starts_with("Authentication failed"));
        assert!(!err.to_string().contains("sk-secret-123"));
        assert_eq!(adapter.usage_stats().failed_request_count, 1);
    }

    #[tokio::test]
    async fn send_reports_function_call() {
        let transport = MockTransport::new().with_reply(MockReply::openai_function_call(
            "get_weather",
            json!({"location": "Tokyo"}),
        ));
        let adapter = adapter(ProviderConfig::openai("sk-test", "gpt-4"), &transport);
        let request = Request::new("Weather in Tokyo?").with_function(FunctionDefinition::new(
            "get_weather",
            "Look up the weather",
            json!({"type": "object", "properties": {"location": {"type": "string"}}}),
        ));

        let response = adapter.send(&request).await.unwrap();

        let call = response.function_call.unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments["location"], "Tokyo");
    }

    #[test]
    fn check_capabilities_rejects_vision_on_text_model() {
        let adapter = adapter(
            ProviderConfig::deepseek("sk-test", "deepseek-chat"),
            &MockTransport::new(),
        );
        let request = Request::new("describe").with_image(ImageInput::png("iVBORw0KGgo="));

        assert_eq!(
            adapter.check_capabilities(&request),
            Err(ProviderError::Capability {
                capability: Capability::Vision,
                model: "deepseek-chat".to_string()
            })
        );
    }

    #[tokio::test]
    async fn stream_yields_chunks_then_final() {
        let transport = MockTransport::new()
            .with_reply(MockReply::anthropic_stream(&["Hel", "lo"], 5, 7));
        let adapter = adapter(
            ProviderConfig::claude("sk-ant", "claude-3-5-sonnet-20241022"),
            &transport,
        );

        let chunks: Vec<_> = adapter
            .stream(&Request::new("hi").streaming())
            .await
            .unwrap()
            .collect()
            .await;

        let chunks: Vec<_> = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "Hel");
        assert_eq!(chunks[1].text, "lo");
        assert!(chunks[2].is_final);
        assert_eq!(chunks[2].tokens_used, Some(12));
        assert_eq!(adapter.usage_stats().total_tokens, 12);
    }

    #[tokio::test]
    async fn stream_open_failure_is_an_error() {
        let transport = MockTransport::new().with_reply(MockReply::error_status(503, "overloaded"));
        let adapter = adapter(ProviderConfig::openai("sk-test", "gpt-4"), &transport);

        let err = adapter.stream(&Request::new("hi")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Server { status: 503, .. }));
        assert_eq!(adapter.usage_stats().failed_request_count, 1);
    }

    #[tokio::test]
    async fn stream_ending_early_is_a_network_error() {
        let transport = MockTransport::new().with_reply(MockReply::Events(vec![MockEvent::Data(
            json!({"choices": [{"delta": {"content": "partial"}}]}).to_string(),
        )]));
        let adapter = adapter(ProviderConfig::openai("sk-test", "gpt-4"), &transport);

        let mut chunks = adapter.stream(&Request::new("hi")).await.unwrap();

        assert_eq!(chunks.next().await.unwrap().unwrap().text, "partial");
        assert!(matches!(
            chunks.next().await,
            Some(Err(ProviderError::Network(_)))
        ));
        assert!(chunks.next().await.is_none());
        assert_eq!(adapter.usage_stats().failed_request_count, 1);
    }
}
