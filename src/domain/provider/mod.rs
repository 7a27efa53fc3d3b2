//! Provider domain: the uniform contract every backend is mapped onto.

mod errors;
mod health;
mod kind;
mod request;
mod response;
mod retry;
mod stream;
mod usage;

pub use errors::{ConfigError, ErrorKind, ProviderError, ProviderFailure};
pub use health::{HealthPolicy, HealthRecord, HealthState, HealthStatus};
pub use kind::{Capabilities, Capability, ProviderKind, WireFormat};
pub use request::{FunctionDefinition, ImageInput, Request};
pub use response::{estimate_tokens, FunctionCall, Response, StreamChunk};
pub use retry::RetryPolicy;
pub use stream::ChunkStream;
pub use usage::UsageStats;
