//! Domain layer containing the provider contract and its value types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps)
//! - `provider` - Requests, responses, errors, health and usage types

pub mod foundation;
pub mod provider;
