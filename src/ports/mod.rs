//! Ports - Interfaces for external dependencies.
//!
//! - `Transport` - Sends vendor requests; HTTP in production, scripted in tests
//! - `ProviderCodec` - Vendor wire format mapping

mod provider_codec;
mod transport;

pub use provider_codec::{ParsedResponse, ProviderCodec, StreamEvent, TokenCount};
pub use transport::{HeaderValue, Transport, WireBody, WireRequest, WireResponse, WireStream};
