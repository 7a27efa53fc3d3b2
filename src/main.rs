//! `llm-orchestrator` - send prompts through the configured providers.
//!
//! - `llm-orchestrator send <prompt>` - one request with fallback
//! - `llm-orchestrator stream <prompt>` - stream the reply to stdout
//! - `llm-orchestrator health` - provider health and usage as JSON

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use llm_orchestrator::telemetry::{init_logging, LogFormat};
use llm_orchestrator::{create_provider_manager, OrchestratorConfig, ProviderManager, Request};

/// Send prompts through the configured LLM providers
#[derive(Parser)]
#[command(name = "llm-orchestrator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./llm-orchestrator.{toml,yaml} if present)
    #[arg(short, long, global = true, env = "LLM_ORCHESTRATOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LLM_ORCHESTRATOR_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt and print the reply
    Send {
        prompt: String,

        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Stream a reply to stdout
    Stream {
        prompt: String,

        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Print provider health and usage
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_logging(&cli.log_level, format)?;

    let config = match &cli.config {
        Some(path) => OrchestratorConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => OrchestratorConfig::load().context("Failed to load configuration")?,
    };
    config.validate().context("Invalid configuration")?;

    let manager = create_provider_manager(&config).context("Failed to configure providers")?;
    info!(providers = ?manager.provider_ids(), "providers configured");

    match cli.command {
        Commands::Send { prompt, max_tokens } => send(&manager, request(prompt, max_tokens)).await,
        Commands::Stream { prompt, max_tokens } => {
            stream(&manager, request(prompt, max_tokens).streaming()).await
        }
        Commands::Health => health(&manager),
    }
}

fn request(prompt: String, max_tokens: Option<u32>) -> Request {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let request = Request::new(prompt).with_cancellation(cancel);
    match max_tokens {
        Some(max) => request.with_max_tokens(max),
        None => request,
    }
}

async fn send(manager: &ProviderManager, request: Request) -> Result<()> {
    let response = manager.send_with_fallback(&request).await?;
    info!(
        provider = %response.provider,
        model = %response.model,
        tokens = response.tokens_used,
        "request completed"
    );

    println!("{}", response.text);
    if let Some(call) = response.function_call {
        println!("{}", serde_json::to_string_pretty(&call)?);
    }
    Ok(())
}

async fn stream(manager: &ProviderManager, request: Request) -> Result<()> {
    let mut chunks = manager.stream_with_fallback(&request).await?;
    let mut stdout = std::io::stdout();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        write!(stdout, "{}", chunk.text)?;
        stdout.flush()?;
        if let Some(tokens) = chunk.tokens_used {
            info!(tokens, "stream completed");
        }
    }
    writeln!(stdout)?;
    Ok(())
}

fn health(manager: &ProviderManager) -> Result<()> {
    let report = serde_json::json!({
        "health": manager.all_health(),
        "usage": manager.get_usage_stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
