//! Mock transport for testing.
//!
//! Scripts vendor replies so adapters, the orchestrator and the manager can
//! be exercised without network access.
//!
//! # Features
//!
//! - Replies consumed in order, with an optional default once exhausted
//! - Vendor-shaped payload helpers (OpenAI, Claude, Gemini)
//! - Simulated latency and hung calls for timeout and cancellation tests
//! - Request capture for verification
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new()
//!     .with_reply(MockReply::openai_text("你好", 7))
//!     .with_delay(Duration::from_millis(100));
//!
//! let client = create_provider_with_transport(config, Arc::new(transport))?;
//! ```

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::provider::ProviderError;
use crate::ports::{Transport, WireBody, WireRequest, WireResponse, WireStream};

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A complete HTTP reply.
    Body {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
    /// A successful SSE stream.
    Events(Vec<MockEvent>),
    /// A connection-level failure.
    Error(ProviderError),
    /// A call that never completes.
    Hang,
}

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum MockEvent {
    /// An SSE `data` payload.
    Data(String),
    /// Pause before the next step.
    Delay(Duration),
    /// A connection drop.
    Error(ProviderError),
    /// Stop producing anything, without ending.
    Hang,
}

impl MockReply {
    /// A 200 reply with a JSON body.
    pub fn ok(body: serde_json::Value) -> Self {
        Self::status(200, body)
    }

    /// A reply with the given status and JSON body.
    pub fn status(status: u16, body: serde_json::Value) -> Self {
        MockReply::Body {
            status,
            body: body.to_string(),
            retry_after: None,
        }
    }

    /// A vendor-style error reply (`{"error": {"message": ...}}`).
    pub fn error_status(status: u16, message: impl Into<String>) -> Self {
        Self::status(status, json!({"error": {"message": message.into()}}))
    }

    /// A 429 with a `Retry-After` header.
    pub fn rate_limited(retry_after: Duration) -> Self {
        MockReply::Body {
            status: 429,
            body: json!({"error": {"message": "Rate limit exceeded"}}).to_string(),
            retry_after: Some(retry_after),
        }
    }

    /// A connection-level failure.
    pub fn network_error(message: impl Into<String>) -> Self {
        MockReply::Error(ProviderError::network(message))
    }

    /// OpenAI chat completion with text content.
    pub fn openai_text(text: impl Into<String>, total_tokens: u32) -> Self {
        let completion = total_tokens / 2;
        Self::ok(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text.into()},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": total_tokens - completion,
                "completion_tokens": completion,
                "total_tokens": total_tokens
            }
        }))
    }

    /// OpenAI chat completion that calls a function.
    pub fn openai_function_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ok(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_mock",
                        "type": "function",
                        "function": {"name": name.into(), "arguments": arguments.to_string()}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
        }))
    }

    /// Claude message with text content.
    pub fn anthropic_text(text: impl Into<String>, input_tokens: u32, output_tokens: u32) -> Self {
        Self::ok(json!({
            "id": "msg_mock",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text.into()}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens}
        }))
    }

    /// Gemini response with text content.
    pub fn gemini_text(text: impl Into<String>, prompt_tokens: u32, output_tokens: u32) -> Self {
        Self::ok(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text.into()}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": prompt_tokens,
                "candidatesTokenCount": output_tokens,
                "totalTokenCount": prompt_tokens + output_tokens
            }
        }))
    }

    /// OpenAI stream: one chunk per delta, a usage chunk, then `[DONE]`.
    pub fn openai_stream(deltas: &[&str], total_tokens: u32) -> Self {
        MockReply::Events(openai_stream_events(deltas, total_tokens))
    }

    /// OpenAI stream with a pause before every delta.
    pub fn openai_stream_with_delay(deltas: &[&str], delay: Duration) -> Self {
        let events = openai_stream_events(deltas, 10)
            .into_iter()
            .flat_map(|event| [MockEvent::Delay(delay), event])
            .collect();
        MockReply::Events(events)
    }

    /// Claude stream lifecycle around the given deltas.
    pub fn anthropic_stream(deltas: &[&str], input_tokens: u32, output_tokens: u32) -> Self {
        let mut events = vec![MockEvent::Data(
            json!({"type": "message_start", "message": {"id": "msg_mock",
                "usage": {"input_tokens": input_tokens, "output_tokens": 1}}})
            .to_string(),
        )];
        events.extend(deltas.iter().map(|delta| {
            MockEvent::Data(
                json!({"type": "content_block_delta", "index": 0,
                    "delta": {"type": "text_delta", "text": delta}})
                .to_string(),
            )
        }));
        events.push(MockEvent::Data(
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"},
                "usage": {"output_tokens": output_tokens}})
            .to_string(),
        ));
        events.push(MockEvent::Data(json!({"type": "message_stop"}).to_string()));
        MockReply::Events(events)
    }
}

fn openai_stream_events(deltas: &[&str], total_tokens: u32) -> Vec<MockEvent> {
    let mut events: Vec<MockEvent> = deltas
        .iter()
        .map(|delta| {
            MockEvent::Data(
                json!({"choices": [{"index": 0, "delta": {"content": delta}, "finish_reason": null}]})
                    .to_string(),
            )
        })
        .collect();
    let completion = total_tokens / 2;
    events.push(MockEvent::Data(
        json!({"choices": [], "usage": {
            "prompt_tokens": total_tokens - completion,
            "completion_tokens": completion
        }})
        .to_string(),
    ));
    events.push(MockEvent::Data("[DONE]".to_string()));
    events
}

/// Scripted transport.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    default_reply: Option<MockReply>,
    delay: Duration,
    requests: Arc<Mutex<Vec<WireRequest>>>,
}

impl MockTransport {
    /// Creates a transport with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply.
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push_reply(reply);
        self
    }

    /// Reply used once the queue is exhausted.
    pub fn with_default_reply(mut self, reply: MockReply) -> Self {
        self.default_reply = Some(reply);
        self
    }

    /// Sets simulated latency before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues a reply on a shared transport.
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Returns the number of requests received.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Returns all received requests.
    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Clears the request history.
    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    async fn next_reply(&self, request: WireRequest) -> MockReply {
        self.requests.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let reply = self.replies.lock().unwrap().pop_front();
        reply
            .or_else(|| self.default_reply.clone())
            .unwrap_or_else(|| MockReply::network_error("no mock reply scripted"))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, ProviderError> {
        match self.next_reply(request).await {
            MockReply::Body {
                status,
                body,
                retry_after,
            } => Ok(WireResponse {
                status,
                retry_after,
                body,
            }),
            MockReply::Events(_) => Err(ProviderError::invalid_response(
                "streaming reply scripted for a non-streaming call",
            )),
            MockReply::Error(err) => Err(err),
            MockReply::Hang => std::future::pending().await,
        }
    }

    async fn open_stream(&self, request: WireRequest) -> Result<WireStream, ProviderError> {
        match self.next_reply(request).await {
            MockReply::Body {
                status,
                body,
                retry_after,
            } if !(200..300).contains(&status) => Ok(WireStream {
                status,
                retry_after,
                body: WireBody::Complete(body),
            }),
            MockReply::Body { status, body, .. } => Ok(WireStream {
                status,
                retry_after: None,
                body: WireBody::Events(Box::pin(futures::stream::iter(vec![Ok(body)]))),
            }),
            MockReply::Events(events) => {
                let stream = async_stream::stream! {
                    for event in events {
                        match event {
                            MockEvent::Data(data) => yield Ok(data),
                            MockEvent::Delay(delay) => sleep(delay).await,
                            MockEvent::Error(err) => {
                                yield Err(err);
                                return;
                            }
                            MockEvent::Hang => std::future::pending::<()>().await,
                        }
                    }
                };
                Ok(WireStream {
                    status: 200,
                    retry_after: None,
                    body: WireBody::Events(Box::pin(stream)),
                })
            }
            MockReply::Error(err) => Err(err),
            MockReply::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn request() -> WireRequest {
        WireRequest::post("https://mock.local/v1/chat/completions", json!({"model": "gpt-4"}))
    }

    #[tokio::test]
    async fn replies_in_order_then_default() {
        let transport = MockTransport::new()
            .with_reply(MockReply::openai_text("first", 4))
            .with_default_reply(MockReply::error_status(500, "down"));

        let first = transport.execute(request()).await.unwrap();
        assert_eq!(first.status, 200);
        assert!(first.body.contains("first"));

        let second = transport.execute(request()).await.unwrap();
        assert_eq!(second.status, 500);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn unscripted_call_is_network_error() {
        let transport = MockTransport::new();
        let err = transport.execute(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }

    #[tokio::test]
    async fn records_requests() {
        let transport = MockTransport::new().with_default_reply(MockReply::ok(json!({})));
        transport.execute(request()).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body["model"], "gpt-4");

        transport.clear_requests();
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn streams_scripted_events() {
        let transport = MockTransport::new().with_reply(MockReply::openai_stream(&["a", "b"], 6));

        let stream = transport.open_stream(request()).await.unwrap();
        assert!(stream.is_success());
        let events: Vec<_> = match stream.body {
            WireBody::Events(events) => events.collect().await,
            WireBody::Complete(_) => panic!("expected events"),
        };

        assert_eq!(events.len(), 4);
        assert_eq!(events.last().unwrap().as_ref().unwrap(), "[DONE]");
    }

    #[tokio::test]
    async fn error_status_on_stream_is_complete_body() {
        let transport = MockTransport::new().with_reply(MockReply::error_status(401, "bad key"));

        let stream = transport.open_stream(request()).await.unwrap();
        assert_eq!(stream.status, 401);
        assert!(matches!(stream.body, WireBody::Complete(ref body) if body.contains("bad key")));
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_resolves() {
        let transport = MockTransport::new().with_reply(MockReply::Hang);
        let result =
            tokio::time::timeout(Duration::from_secs(60), transport.execute(request())).await;
        assert!(result.is_err());
    }
}
