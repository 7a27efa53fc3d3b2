//! ProviderCodec port - vendor-specific request building and response parsing.

use crate::domain::provider::{FunctionCall, ProviderError, Request, WireFormat};

use super::transport::WireRequest;

/// Translates the uniform contract to and from one vendor's wire format.
///
/// Codecs are pure: no I/O, no retries, no status handling.
pub trait ProviderCodec: Send + Sync {
    /// The wire format this codec speaks.
    fn wire_format(&self) -> WireFormat;

    /// Builds the vendor request for a call.
    fn build_request(&self, request: &Request, stream: bool) -> WireRequest;

    /// Parses a successful non-streaming body.
    fn parse_response(&self, body: &str) -> Result<ParsedResponse, ProviderError>;

    /// Parses one SSE `data` payload into zero or more events.
    fn parse_event(&self, data: &str) -> Result<Vec<StreamEvent>, ProviderError>;
}

/// Token counts as reported by a vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCount {
    pub input: u32,
    pub output: u32,
}

impl TokenCount {
    pub fn total(&self) -> u32 {
        self.input.saturating_add(self.output)
    }
}

/// A parsed non-streaming reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub text: String,
    pub function_call: Option<FunctionCall>,
    /// Usage reported by the vendor, if it reported any.
    pub usage: Option<TokenCount>,
    pub raw: serde_json::Value,
}

/// One decoded streaming event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A text delta.
    Text(String),
    /// Usage figures. Later values replace earlier ones field by field.
    Usage {
        input: Option<u32>,
        output: Option<u32>,
    },
    /// The vendor signalled the end of the stream.
    Done,
    /// The vendor reported an error inside the stream.
    Failed(ProviderError),
}
