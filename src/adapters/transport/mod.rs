//! Transport implementations.
//!
//! - `http` - reqwest client with SSE decoding
//! - `mock` - scripted replies for tests

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::{MockEvent, MockReply, MockTransport};
