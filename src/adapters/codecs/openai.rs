//! OpenAI chat completions codec.
//!
//! Shared by every OpenAI-compatible backend. They differ only in the path,
//! the auth header, and whether `stream_options` is understood.
//!
//! # Streaming
//!
//! Each SSE `data` payload is a `chat.completion.chunk`. Usage arrives in a
//! trailing chunk with empty `choices` and the stream ends with `[DONE]`.

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::domain::provider::{FunctionCall, ProviderError, Request, WireFormat};
use crate::ports::{ParsedResponse, ProviderCodec, StreamEvent, TokenCount, WireRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>` (Azure)
    ApiKeyHeader,
}

/// Codec for OpenAI-style chat completions.
#[derive(Debug, Clone)]
pub struct OpenAiCodec {
    url: String,
    auth: Auth,
    api_key: Secret<String>,
    model: String,
    stream_usage: bool,
}

impl OpenAiCodec {
    /// api.openai.com style: `{base}/v1/chat/completions`.
    pub fn openai(base_url: &str, api_key: Secret<String>, model: impl Into<String>) -> Self {
        Self {
            url: format!("{base_url}/v1/chat/completions"),
            auth: Auth::Bearer,
            api_key,
            model: model.into(),
            stream_usage: true,
        }
    }

    /// DeepSeek: `{base}/chat/completions`.
    pub fn deepseek(base_url: &str, api_key: Secret<String>, model: impl Into<String>) -> Self {
        Self {
            url: format!("{base_url}/chat/completions"),
            ..Self::openai(base_url, api_key, model)
        }
    }

    /// Moonshot: OpenAI paths, no `stream_options`.
    pub fn moonshot(base_url: &str, api_key: Secret<String>, model: impl Into<String>) -> Self {
        Self {
            stream_usage: false,
            ..Self::openai(base_url, api_key, model)
        }
    }

    /// Azure OpenAI deployment.
    pub fn azure(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: Secret<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            url: format!(
                "{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            ),
            auth: Auth::ApiKeyHeader,
            api_key,
            model: model.into(),
            stream_usage: true,
        }
    }

    /// The completions URL requests are sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn to_openai_request(&self, request: &Request, stream: bool) -> OpenAIRequest {
        let content = if request.images.is_empty() {
            MessageContent::Text(request.prompt.clone())
        } else {
            let mut parts = vec![ContentPart::Text {
                text: request.prompt.clone(),
            }];
            parts.extend(request.images.iter().map(|image| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            }));
            MessageContent::Parts(parts)
        };

        let tools = if request.functions.is_empty() {
            None
        } else {
            Some(
                request
                    .functions
                    .iter()
                    .map(|function| Tool {
                        tool_type: "function",
                        function: ToolFunction {
                            name: function.name.clone(),
                            description: function.description.clone(),
                            parameters: function.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user",
                content,
            }],
            max_tokens: request.max_tokens,
            stream,
            stream_options: (stream && self.stream_usage).then_some(StreamOptions {
                include_usage: true,
            }),
            tools,
        }
    }
}

impl ProviderCodec for OpenAiCodec {
    fn wire_format(&self) -> WireFormat {
        WireFormat::OpenAiChat
    }

    fn build_request(&self, request: &Request, stream: bool) -> WireRequest {
        let body = serde_json::to_value(self.to_openai_request(request, stream))
            .unwrap_or_default();

        let wire = WireRequest::post(self.url.clone(), body).header("content-type", "application/json");
        match self.auth {
            Auth::Bearer => wire.secret_header(
                "authorization",
                Secret::new(format!("Bearer {}", self.api_key.expose_secret())),
            ),
            Auth::ApiKeyHeader => wire.secret_header("api-key", self.api_key.clone()),
        }
    }

    fn parse_response(&self, body: &str) -> Result<ParsedResponse, ProviderError> {
        let raw: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse response: {e}")))?;
        let response: OpenAIResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse response: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("No choices in response"))?;

        let function_call = choice
            .message
            .tool_calls
            .and_then(|calls| calls.into_iter().next())
            .map(|call| call.function)
            .or(choice.message.function_call)
            .map(|call| FunctionCall {
                name: call.name,
                arguments: parse_arguments(&call.arguments),
            });

        Ok(ParsedResponse {
            text: choice.message.content.unwrap_or_default(),
            function_call,
            usage: response.usage.map(|u| TokenCount {
                input: u.prompt_tokens,
                output: u.completion_tokens,
            }),
            raw,
        })
    }

    fn parse_event(&self, data: &str) -> Result<Vec<StreamEvent>, ProviderError> {
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(vec![StreamEvent::Done]);
        }
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let chunk: StreamResponseChunk = serde_json::from_str(data).map_err(|e| {
            ProviderError::invalid_response(format!("Failed to parse SSE chunk: {e}"))
        })?;

        if let Some(error) = chunk.error {
            return Ok(vec![StreamEvent::Failed(ProviderError::server(
                500,
                error.message.unwrap_or_else(|| "Stream error".to_string()),
            ))]);
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Text(content));
                }
            }
        }
        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage {
                input: Some(usage.prompt_tokens),
                output: Some(usage.completion_tokens),
            });
        }
        Ok(events)
    }
}

/// Tool arguments arrive as a JSON string; keep the raw string if it is not JSON.
fn parse_arguments(arguments: &str) -> serde_json::Value {
    serde_json::from_str(arguments)
        .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()))
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ToolFunction,
}

#[derive(Debug, Serialize)]
struct ToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
    function_call: Option<CalledFunction>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: CalledFunction,
}

#[derive(Debug, Deserialize)]
struct CalledFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
    error: Option<StreamErrorContent>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorContent {
    message: Option<String>,
}
