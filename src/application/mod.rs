//! Application layer - adapters, policies and the manager that ties them together.
//!
//! - `provider_adapter` - one configured vendor, one network attempt per call
//! - `usage_tracker` - tokens, requests, quota and rate window per adapter
//! - `health_monitor` - healthy/degraded classification
//! - `orchestrator` - retry, timeout and cancellation around one adapter
//! - `manager` - selection and fallback across adapters
//! - `client` - single-provider client and factory functions

mod client;
mod health_monitor;
mod manager;
mod orchestrator;
mod provider_adapter;
mod usage_tracker;

pub use client::{
    create_provider, create_provider_manager, create_provider_manager_with_transport,
    create_provider_with_transport, ProviderClient,
};
pub use health_monitor::HealthMonitor;
pub use manager::{FallbackChain, ManagerOptions, ProviderManager, ProviderUsage};
pub use orchestrator::RequestOrchestrator;
pub use provider_adapter::ProviderAdapter;
pub use usage_tracker::UsageTracker;
