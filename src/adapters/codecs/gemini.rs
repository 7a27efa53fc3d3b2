//! Gemini generateContent codec.
//!
//! Streaming uses `:streamGenerateContent?alt=sse`; every SSE payload is a
//! complete `GenerateContentResponse` and the last one carries `finishReason`.

use secrecy::Secret;
use serde::{Deserialize, Serialize};

use crate::domain::provider::{FunctionCall, ProviderError, Request, WireFormat};
use crate::ports::{ParsedResponse, ProviderCodec, StreamEvent, TokenCount, WireRequest};

/// Codec for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiCodec {
    base_url: String,
    api_key: Secret<String>,
    model: String,
}

impl GeminiCodec {
    pub fn new(base_url: &str, api_key: Secret<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key,
            model: model.into(),
        }
    }

    fn url(&self, stream: bool) -> String {
        if stream {
            format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model
            )
        } else {
            format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
        }
    }

    fn to_gemini_request(&self, request: &Request) -> GeminiRequest {
        let mut parts = vec![Part::Text {
            text: request.prompt.clone(),
        }];
        parts.extend(request.images.iter().map(|image| Part::InlineData {
            inline_data: InlineData {
                mime_type: image.media_type.clone(),
                data: image.data.clone(),
            },
        }));

        let tools = (!request.functions.is_empty()).then(|| {
            vec![GeminiTool {
                function_declarations: request
                    .functions
                    .iter()
                    .map(|function| FunctionDeclaration {
                        name: function.name.clone(),
                        description: function.description.clone(),
                        parameters: function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        GeminiRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: request.max_tokens.map(|max| GenerationConfig {
                max_output_tokens: max,
            }),
            tools,
        }
    }
}

impl ProviderCodec for GeminiCodec {
    fn wire_format(&self) -> WireFormat {
        WireFormat::GeminiContent
    }

    fn build_request(&self, request: &Request, stream: bool) -> WireRequest {
        let body = serde_json::to_value(self.to_gemini_request(request)).unwrap_or_default();

        WireRequest::post(self.url(stream), body)
            .header("content-type", "application/json")
            .secret_header("x-goog-api-key", self.api_key.clone())
    }

    fn parse_response(&self, body: &str) -> Result<ParsedResponse, ProviderError> {
        let raw: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse response: {e}")))?;
        let response: GeminiResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse response: {e}")))?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("No candidates in response"))?;

        let mut text = String::new();
        let mut function_call = None;
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(part_text) = part.text {
                text.push_str(&part_text);
            }
            if let Some(call) = part.function_call {
                function_call.get_or_insert(FunctionCall {
                    name: call.name,
                    arguments: call.args,
                });
            }
        }

        Ok(ParsedResponse {
            text,
            function_call,
            usage: response.usage_metadata.map(|usage| TokenCount {
                input: usage.prompt_token_count.unwrap_or(0),
                output: usage.candidates_token_count.unwrap_or(0),
            }),
            raw,
        })
    }

    fn parse_event(&self, data: &str) -> Result<Vec<StreamEvent>, ProviderError> {
        let data = data.trim();
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let chunk: GeminiResponse = serde_json::from_str(data).map_err(|e| {
            ProviderError::invalid_response(format!("Failed to parse SSE chunk: {e}"))
        })?;

        let mut events = Vec::new();
        let mut finished = false;
        for candidate in chunk.candidates {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(text) = part.text.filter(|text| !text.is_empty()) {
                    events.push(StreamEvent::Text(text));
                }
            }
            finished |= candidate.finish_reason.is_some();
        }
        if let Some(usage) = chunk.usage_metadata {
            events.push(StreamEvent::Usage {
                input: usage.prompt_token_count,
                output: usage.candidates_token_count,
            });
        }
        if finished {
            events.push(StreamEvent::Done);
        }
        Ok(events)
    }
}

// ----- Gemini API Types -----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::{FunctionDefinition, ImageInput};
    use serde_json::json;

    fn codec() -> GeminiCodec {
        GeminiCodec::new(
            "https://generativelanguage.googleapis.com",
            Secret::new("g-key".to_string()),
            "gemini-1.5-pro",
        )
    }

    #[test]
    fn builds_urls_per_mode() {
        let plain = codec().build_request(&Request::new("Hi"), false);
        assert_eq!(
            plain.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
        );

        let streaming = codec().build_request(&Request::new("Hi"), true);
        assert!(streaming.url.ends_with(":streamGenerateContent?alt=sse"));
        assert_eq!(
            streaming.header_value("x-goog-api-key").map(|v| v.expose()),
            Some("g-key")
        );
    }

    #[test]
    fn builds_multimodal_parts_and_tools() {
        let request = Request::new("What is this?")
            .with_max_tokens(64)
            .with_image(ImageInput::png("aGVsbG8="))
            .with_function(FunctionDefinition::new("lookup", "Look up", json!({"type": "object"})));
        let wire = codec().build_request(&request, false);

        let parts = &wire.body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "What is this?");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(wire.body["generationConfig"]["maxOutputTokens"], 64);
        assert_eq!(wire.body["tools"][0]["functionDeclarations"][0]["name"], "lookup");
    }

    #[test]
    fn parses_response_with_usage() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Bonjour"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6}
        })
        .to_string();

        let parsed = codec().parse_response(&body).unwrap();
        assert_eq!(parsed.text, "Bonjour");
        assert_eq!(parsed.usage.unwrap().total(), 6);
    }

    #[test]
    fn parses_function_call_response() {
        let body = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "lookup", "args": {"q": "rust"}}}
            ]}}]
        })
        .to_string();

        let parsed = codec().parse_response(&body).unwrap();
        assert_eq!(parsed.function_call.unwrap().arguments["q"], "rust");
        assert_eq!(parsed.text, "");
    }

    #[test]
    fn stream_ends_on_finish_reason() {
        let codec = codec();

        let first = codec
            .parse_event(r#"{"candidates":[{"content":{"parts":[{"text":"Bon"}]}}]}"#)
            .unwrap();
        assert_eq!(first, vec![StreamEvent::Text("Bon".to_string())]);

        let last = codec
            .parse_event(
                r#"{"candidates":[{"content":{"parts":[{"text":"jour"}]},"finishReason":"STOP"}],
                   "usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":2}}"#,
            )
            .unwrap();
        assert_eq!(
            last,
            vec![
                StreamEvent::Text("jour".to_string()),
                StreamEvent::Usage { input: Some(4), output: Some(2) },
                StreamEvent::Done,
            ]
        );
    }
}
