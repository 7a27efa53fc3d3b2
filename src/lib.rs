//! LLM provider orchestration layer.
//!
//! Uniform access to several LLM backends (OpenAI, Claude, Gemini, Azure
//! OpenAI, DeepSeek, Moonshot) with per-provider usage tracking, quotas,
//! request throttling, health classification and automatic fallback.
//!
//! ```no_run
//! use llm_orchestrator::{create_provider, ProviderConfig, Request};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = create_provider(ProviderConfig::openai("sk-...", "gpt-4o"))?;
//! let response = client.send_request(&Request::new("Translate to Chinese: Hello")).await?;
//! println!("{} ({} tokens)", response.text, response.tokens_used);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

pub use application::{
    create_provider, create_provider_manager, create_provider_manager_with_transport,
    create_provider_with_transport, ManagerOptions, ProviderAdapter, ProviderClient,
    ProviderManager,
};
pub use config::{OrchestratorConfig, ProviderConfig};
pub use domain::provider::{
    ChunkStream, ConfigError, FunctionDefinition, HealthState, HealthStatus, ImageInput,
    ProviderError, Request, Response, StreamChunk, UsageStats,
};
