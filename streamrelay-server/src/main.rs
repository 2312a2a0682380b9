use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use streamrelay_core::{HttpSource, RelayConfig, RelayManager};
use streamrelay_server::{init_tracing, telemetry::DEFAULT_FILTER, RelayRouter};
use streamrelay_upstream::UpstreamClient;

/// Relay streamed agent generations to HTTP clients as NDJSON
#[derive(Debug, Parser)]
#[command(name = "streamrelay", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "STREAMRELAY_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Path of the generation endpoint; cancel is served at `{path}/cancel`
    #[arg(long, env = "STREAMRELAY_PATH", default_value = "/api/generate")]
    path: String,

    /// Base URL of the upstream generation service
    #[arg(long, env = "STREAMRELAY_UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Bearer token for the upstream service
    #[arg(long, env = "STREAMRELAY_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Fail a generation after this many seconds without an upstream event
    #[arg(
        long,
        env = "STREAMRELAY_IDLE_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    idle_timeout_secs: u64,

    /// Give up waiting for upstream to acknowledge a cancel after this many seconds
    #[arg(
        long,
        env = "STREAMRELAY_CANCEL_TIMEOUT_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    cancel_timeout_secs: u64,

    /// Records buffered per relay before backpressure applies
    #[arg(long, env = "STREAMRELAY_CHANNEL_CAPACITY", default_value_t = 64)]
    channel_capacity: usize,

    /// Compare each completed answer with the upstream's stored message
    #[arg(long, env = "STREAMRELAY_VERIFY_FINAL_STATE")]
    verify_final_state: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "STREAMRELAY_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(DEFAULT_FILTER, args.log_json);

    let mut client = UpstreamClient::builder().api_key(args.api_key);
    if let Some(url) = args.upstream_url {
        client = client.api_base(url);
    }
    let client = client.build().context("invalid upstream client configuration")?;
    tracing::info!(upstream = %client.api_base(), "upstream configured");

    let config = RelayConfig::new()
        .with_idle_timeout(Duration::from_secs(args.idle_timeout_secs))
        .with_channel_capacity(args.channel_capacity)
        .with_cancel_timeout(Duration::from_secs(args.cancel_timeout_secs))
        .with_verify_final_state(args.verify_final_state);
    let manager = Arc::new(RelayManager::new(HttpSource::new(client), config));

    let app = RelayRouter::from_arc(manager)
        .with_generations(args.path.as_str())
        .build()
        .context("failed to build router")?;

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, path = %args.path, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
