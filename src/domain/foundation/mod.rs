//! Foundation module - Shared domain primitives.

mod ids;
mod timestamp;

pub use ids::{ProviderId, RequestId};
pub use timestamp::Timestamp;
