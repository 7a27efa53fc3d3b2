//! Completed responses and streaming chunks.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ProviderId;

/// Result of a completed, non-streaming call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Generated text (empty when the model only called a function).
    pub text: String,
    /// Tokens consumed by the call, reported or estimated.
    pub tokens_used: u32,
    /// Function the model decided to call, if any.
    pub function_call: Option<FunctionCall>,
    /// Provider that produced the response.
    pub provider: ProviderId,
    /// Model that produced the response.
    pub model: String,
    /// Number of request images the provider accepted.
    pub images_processed: usize,
    /// Vendor payload, kept for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl Response {
    /// Returns true if the provider consumed at least one image.
    pub fn has_processed_image(&self) -> bool {
        self.images_processed > 0
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Called function name.
    pub name: String,
    /// Arguments as JSON.
    pub arguments: serde_json::Value,
}

/// One element of a streaming response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta carried by this chunk.
    pub text: String,
    /// True on the last chunk of a successful stream.
    pub is_final: bool,
    /// Tokens consumed, present on the final chunk.
    pub tokens_used: Option<u32>,
}

impl StreamChunk {
    /// Creates a content chunk.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            tokens_used: None,
        }
    }

    /// Creates the final chunk.
    pub fn final_chunk(tokens_used: u32) -> Self {
        Self {
            text: String::new(),
            is_final: true,
            tokens_used: Some(tokens_used),
        }
    }
}

/// Rough token estimate used when a backend does not report usage.
///
/// ~4 characters per token, never zero for non-empty text.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    (text.chars().count() / 4).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_chunk_is_not_final() {
        let chunk = StreamChunk::content("Hello");
        assert!(!chunk.is_final);
        assert_eq!(chunk.text, "Hello");
        assert!(chunk.tokens_used.is_none());
    }

    #[test]
    fn final_chunk_carries_usage() {
        let chunk = StreamChunk::final_chunk(42);
        assert!(chunk.is_final);
        assert_eq!(chunk.text, "");
        assert_eq!(chunk.tokens_used, Some(42));
    }

    #[test]
    fn estimate_tokens_approximates() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("Hi"), 1);
        assert_eq!(estimate_tokens("Hello, world!"), 3);
        assert_eq!(estimate_tokens("你好世界你好世界"), 2);
    }

    #[test]
    fn raw_payload_is_omitted_when_absent() {
        let response = Response {
            text: "你好".to_string(),
            tokens_used: 12,
            function_call: None,
            provider: ProviderId::new("openai"),
            model: "gpt-4".to_string(),
            images_processed: 0,
            raw: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("raw").is_none());
        assert_eq!(json["provider"], "openai");
        assert!(!response.has_processed_image());
    }
}
