//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `codecs` - Vendor wire formats (OpenAI, Claude, Gemini)
//! - `transport` - HTTP and mock transports

pub mod codecs;
pub mod transport;

pub use codecs::{codec_for, AnthropicCodec, GeminiCodec, OpenAiCodec};
pub use transport::{HttpTransport, MockEvent, MockReply, MockTransport};
