//! The uniform request every adapter accepts.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::kind::Capability;
use crate::domain::foundation::RequestId;

/// One logical call to a provider.
///
/// Built once per call and never mutated afterwards; the builder methods
/// consume and return `self`. The cancellation token is shared with whoever
/// holds a clone of it, and cancelling is one-way.
#[derive(Debug, Clone)]
pub struct Request {
    /// Correlation id for logs.
    pub id: RequestId,
    /// Prompt text sent as the user turn.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Whether the caller intends to consume a stream.
    pub stream: bool,
    /// Functions the model may call.
    pub functions: Vec<FunctionDefinition>,
    /// Images sent alongside the prompt.
    pub images: Vec<ImageInput>,
    cancellation: CancellationToken,
}

impl Request {
    /// Creates a request with a fresh cancellation token.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            prompt: prompt.into(),
            max_tokens: None,
            stream: false,
            functions: Vec::new(),
            images: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Marks the request as streaming.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Adds a callable function.
    pub fn with_function(mut self, function: FunctionDefinition) -> Self {
        self.functions.push(function);
        self
    }

    /// Adds an image input.
    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.images.push(image);
        self
    }

    /// Uses a caller-owned cancellation token instead of the default one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the request's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns true once the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Capabilities this request needs from the adapter.
    pub fn required_capabilities(&self) -> Vec<Capability> {
        let mut required = Vec::new();
        if !self.functions.is_empty() {
            required.push(Capability::FunctionCalling);
        }
        if !self.images.is_empty() {
            required.push(Capability::Vision);
        }
        required
    }
}

/// A function the model may choose to call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,
    /// What the function does.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: serde_json::Value,
}

impl FunctionDefinition {
    /// Creates a function definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A base64-encoded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInput {
    /// MIME type, e.g. "image/png".
    pub media_type: String,
    /// Base64 payload without a data-URL prefix.
    pub data: String,
}

impl ImageInput {
    /// Creates a PNG image input.
    pub fn png(data: impl Into<String>) -> Self {
        Self {
            media_type: "image/png".to_string(),
            data: data.into(),
        }
    }

    /// Creates an image input with an explicit media type.
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Returns the image as a data URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}
