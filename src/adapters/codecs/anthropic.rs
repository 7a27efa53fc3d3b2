//! Anthropic Claude messages codec.
//!
//! Streaming payloads carry their event name in the JSON `type` field
//! (`message_start`, `content_block_delta`, `message_delta`, `message_stop`,
//! `error`), so the SSE `event:` line is not needed.

use secrecy::Secret;
use serde::{Deserialize, Serialize};

use crate::domain::provider::{FunctionCall, ProviderError, Request, WireFormat};
use crate::ports::{ParsedResponse, ProviderCodec, StreamEvent, TokenCount, WireRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// HTTP-like status Anthropic uses for overload.
const OVERLOADED_STATUS: u16 = 529;

/// Codec for the Claude messages API.
#[derive(Debug, Clone)]
pub struct AnthropicCodec {
    url: String,
    api_key: Secret<String>,
    model: String,
}

impl AnthropicCodec {
    pub fn new(base_url: &str, api_key: Secret<String>, model: impl Into<String>) -> Self {
        Self {
            url: format!("{base_url}/v1/messages"),
            api_key,
            model: model.into(),
        }
    }

    fn to_anthropic_request(&self, request: &Request, stream: bool) -> AnthropicRequest {
        let content = if request.images.is_empty() {
            MessageContent::Text(request.prompt.clone())
        } else {
            let mut blocks: Vec<ContentBlockParam> = request
                .images
                .iter()
                .map(|image| ContentBlockParam::Image {
                    source: ImageSource {
                        source_type: "base64",
                        media_type: image.media_type.clone(),
                        data: image.data.clone(),
                    },
                })
                .collect();
            blocks.push(ContentBlockParam::Text {
                text: request.prompt.clone(),
            });
            MessageContent::Blocks(blocks)
        };

        let tools = (!request.functions.is_empty()).then(|| {
            request
                .functions
                .iter()
                .map(|function| AnthropicTool {
                    name: function.name.clone(),
                    description: function.description.clone(),
                    input_schema: function.parameters.clone(),
                })
                .collect()
        });

        AnthropicRequest {
            model: self.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user",
                content,
            }],
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            stream: stream.then_some(true),
            tools,
        }
    }
}

impl ProviderCodec for AnthropicCodec {
    fn wire_format(&self) -> WireFormat {
        WireFormat::AnthropicMessages
    }

    fn build_request(&self, request: &Request, stream: bool) -> WireRequest {
        let body = serde_json::to_value(self.to_anthropic_request(request, stream))
            .unwrap_or_default();

        WireRequest::post(self.url.clone(), body)
            .header("content-type", "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .secret_header("x-api-key", self.api_key.clone())
    }

    fn parse_response(&self, body: &str) -> Result<ParsedResponse, ProviderError> {
        let raw: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse response: {e}")))?;
        let response: AnthropicResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse response: {e}")))?;

        let mut text = String::new();
        let mut function_call = None;
        for block in response.content {
            match block {
                ContentBlock::Text { text: part } => text.push_str(&part),
                ContentBlock::ToolUse { name, input } => {
                    function_call.get_or_insert(FunctionCall {
                        name,
                        arguments: input,
                    });
                }
                ContentBlock::Other => {}
            }
        }

        Ok(ParsedResponse {
            text,
            function_call,
            usage: Some(TokenCount {
                input: response.usage.input_tokens,
                output: response.usage.output_tokens,
            }),
            raw,
        })
    }

    fn parse_event(&self, data: &str) -> Result<Vec<StreamEvent>, ProviderError> {
        let data = data.trim();
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let event: AnthropicStreamEvent = serde_json::from_str(data).map_err(|e| {
            ProviderError::invalid_response(format!("Failed to parse SSE chunk: {e}"))
        })?;

        let events = match event {
            AnthropicStreamEvent::MessageStart { message } => vec![StreamEvent::Usage {
                input: message.usage.input_tokens,
                output: message.usage.output_tokens,
            }],
            AnthropicStreamEvent::ContentBlockDelta { delta } => match delta.text {
                Some(text) if !text.is_empty() => vec![StreamEvent::Text(text)],
                _ => Vec::new(),
            },
            AnthropicStreamEvent::MessageDelta { usage } => match usage {
                Some(usage) => vec![StreamEvent::Usage {
                    input: usage.input_tokens,
                    output: usage.output_tokens,
                }],
                None => Vec::new(),
            },
            AnthropicStreamEvent::MessageStop => vec![StreamEvent::Done],
            AnthropicStreamEvent::Error { error } => {
                let message = error.message.unwrap_or_else(|| "Stream error".to_string());
                let status = if error.error_type.as_deref() == Some("overloaded_error") {
                    OVERLOADED_STATUS
                } else {
                    500
                };
                vec![StreamEvent::Failed(ProviderError::server(status, message))]
            }
            AnthropicStreamEvent::Other => Vec::new(),
        };
        Ok(events)
    }
}

// ----- Anthropic API Types -----

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlockParam>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockParam {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// Streaming response types
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    MessageStart { message: StreamMessage },
    ContentBlockDelta { delta: TextDelta },
    MessageDelta { usage: Option<StreamUsage> },
    MessageStop,
    Error { error: StreamErrorContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    usage: StreamUsage,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorContent {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::{FunctionDefinition, ImageInput};
    use serde_json::json;

    fn codec() -> AnthropicCodec {
        AnthropicCodec::new(
            "https://api.anthropic.com",
            Secret::new("sk-ant-test".to_string()),
            "claude-3-opus",
        )
    }

    #[test]
    fn builds_request_with_required_max_tokens() {
        let wire = codec().build_request(&Request::new("Hello"), false);

        assert_eq!(wire.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(wire.body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(wire.body["messages"][0]["content"], "Hello");
        assert!(wire.body.get("stream").is_none());
        assert_eq!(
            wire.header_value("anthropic-version").map(|v| v.expose()),
            Some(ANTHROPIC_VERSION)
        );
        assert_eq!(wire.header_value("x-api-key").map(|v| v.expose()), Some("sk-ant-test"));
    }

    #[test]
    fn builds_image_blocks_before_text() {
        let request = Request::new("Describe this").with_image(ImageInput::new("image/jpeg", "abcd"));
        let wire = codec().build_request(&request, true);

        let content = &wire.body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(wire.body["stream"], true);
    }

    #[test]
    fn builds_tools_with_input_schema() {
        let request = Request::new("Weather?").with_function(FunctionDefinition::new(
            "get_weather",
            "Get the weather",
            json!({"type": "object"}),
        ));
        let wire = codec().build_request(&request, false);
        assert_eq!(wire.body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn parses_text_and_tool_use() {
        let body = json!({
            "id": "msg_1",
            "type": "message",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
        .to_string();

        let parsed = codec().parse_response(&body).unwrap();
        assert_eq!(parsed.text, "Let me check.");
        assert_eq!(parsed.function_call.unwrap().arguments["city"], "Paris");
        assert_eq!(parsed.usage.unwrap().total(), 15);
    }

    #[test]
    fn parses_stream_lifecycle() {
        let codec = codec();

        let start = codec
            .parse_event(r#"{"type":"message_start","message":{"id":"m","usage":{"input_tokens":12,"output_tokens":1}}}"#)
            .unwrap();
        assert_eq!(start, vec![StreamEvent::Usage { input: Some(12), output: Some(1) }]);

        let delta = codec
            .parse_event(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#)
            .unwrap();
        assert_eq!(delta, vec![StreamEvent::Text("Hi".to_string())]);

        let usage = codec
            .parse_event(r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":8}}"#)
            .unwrap();
        assert_eq!(usage, vec![StreamEvent::Usage { input: None, output: Some(8) }]);

        assert!(codec.parse_event(r#"{"type":"ping"}"#).unwrap().is_empty());
        assert_eq!(
            codec.parse_event(r#"{"type":"message_stop"}"#).unwrap(),
            vec![StreamEvent::Done]
        );
    }

    #[test]
    fn stream_overload_is_retryable_server_error() {
        let events = codec()
            .parse_event(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .unwrap();

        match &events[..] {
            [StreamEvent::Failed(err)] => {
                assert!(matches!(err, ProviderError::Server { status: 529, .. }));
                assert!(err.is_retryable());
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }
}
