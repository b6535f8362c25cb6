//! Moderation proxy
//!
//! Two services, usually run together:
//! - `gateway`: moderated OpenAI-compatible endpoint in front of a model server
//! - `relay`: status-translating proxy in front of the gateway, for chat
//!   clients that cannot cope with a 4xx in the middle of a conversation

use anyhow::{Context, Result};
use axum::{http::StatusCode, Router};
use clap::{Args, Parser, Subcommand};
use hanzo_moderation::{ModerationConfig, ModerationPipeline};
use hanzo_moderation_proxy::{gateway_router, HttpBackend, RelayConfig, StatusTranslator};
use std::path::PathBuf;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hanzo-moderate")]
#[command(about = "Content-policy gateway and status-translating relay for chat completions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Moderate chat completions in front of an OpenAI-compatible server
    Gateway(GatewayArgs),
    /// Turn policy blocks from the gateway into assistant replies
    Relay(RelayArgs),
}

#[derive(Args, Debug)]
struct GatewayArgs {
    /// Port to listen on
    #[arg(short, long, env = "MODERATION_GATEWAY_PORT", default_value = "4000")]
    port: u16,

    /// Base URL of the model server
    #[arg(long, env = "MODERATION_UPSTREAM_URL", default_value = "http://localhost:8080")]
    upstream_url: String,

    /// Bearer token sent to the model server
    #[arg(long, env = "MODERATION_UPSTREAM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Policy file (TOML); the built-in demo policy is used when absent
    #[arg(long, env = "MODERATION_POLICY")]
    policy: Option<PathBuf>,

    /// Upstream request timeout in seconds
    #[arg(long, env = "MODERATION_TIMEOUT_SECS", default_value = "600")]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct RelayArgs {
    /// Port to listen on
    #[arg(short, long, env = "MODERATION_RELAY_PORT", default_value = "8000")]
    port: u16,

    /// Base URL of the moderated gateway
    #[arg(long, env = "MODERATION_BACKEND_URL", default_value = "http://localhost:4000")]
    backend_url: String,

    /// Status the gateway uses for a policy block
    #[arg(long, env = "MODERATION_BLOCK_STATUS", default_value = "400")]
    block_status: u16,

    /// Backend request timeout in seconds
    #[arg(long, env = "MODERATION_TIMEOUT_SECS", default_value = "600")]
    timeout_secs: u64,
}

async fn serve(port: u16, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("binding port {}", port))?;
    info!(port, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_gateway(args: GatewayArgs) -> Result<()> {
    let config = match &args.policy {
        Some(path) => ModerationConfig::load(path)
            .with_context(|| format!("loading policy {}", path.display()))?,
        None => ModerationConfig::default(),
    };

    let backend = HttpBackend::new(
        &args.upstream_url,
        args.api_key,
        Duration::from_secs(args.timeout_secs),
    )?;
    let endpoint = backend.endpoint().to_string();
    let pipeline = ModerationPipeline::new(&config, backend)?;

    let app = gateway_router(pipeline).layer(CorsLayer::permissive());

    println!(
        r#"
╔══════════════════════════════════════════════════════════════════╗
║     Moderation Gateway (OpenAI-compatible)                       ║
╠══════════════════════════════════════════════════════════════════╣
║  Listening:  http://localhost:{}
║  Endpoint:   http://localhost:{}/v1/chat/completions
║  Upstream:   {}
║  Policy:     {} terms, {} patterns
╚══════════════════════════════════════════════════════════════════╝
"#,
        args.port,
        args.port,
        endpoint,
        config.policy.terms.len(),
        config.policy.patterns.len()
    );

    serve(args.port, app).await
}

async fn run_relay(args: RelayArgs) -> Result<()> {
    let block_status = StatusCode::from_u16(args.block_status)
        .with_context(|| format!("invalid block status {}", args.block_status))?;

    let config = RelayConfig::new(args.backend_url)
        .with_block_status(block_status)
        .with_timeout(Duration::from_secs(args.timeout_secs));
    let translator = StatusTranslator::new(config)?;

    println!(
        r#"
╔══════════════════════════════════════════════════════════════════╗
║     Moderation Relay ({} → 200 assistant message)                ║
╠══════════════════════════════════════════════════════════════════╣
║  Listening:  http://localhost:{}
║  Backend:    {}
╚══════════════════════════════════════════════════════════════════╝
"#,
        block_status.as_u16(),
        args.port,
        translator.config().backend_url
    );

    let app = translator.router().layer(CorsLayer::permissive());
    serve(args.port, app).await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Gateway(args) => run_gateway(args).await,
        Command::Relay(args) => run_relay(args).await,
    }
}
