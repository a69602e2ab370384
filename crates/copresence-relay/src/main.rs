//! `copresence-relay` binary.

use std::path::PathBuf;

use clap::Parser;
use copresence_common::CopresenceError;
use copresence_config::LogLevel;
use copresence_relay::{serve, Hub};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "copresence-relay", about = "WebSocket rendezvous service for presence clients")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 8787)]
    port: u16,

    /// Config file; only `[logging]` applies to the relay.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CopresenceError> {
    let args = Args::parse();

    // Logging is configured from the file, so the file is read first and
    // any failure reported once the subscriber exists.
    let config = args.config.as_deref().map(copresence_config::load_from_path);
    let level = match &config {
        Some(Ok(config)) => config.logging.level,
        _ => LogLevel::default(),
    };
    let directive = format!("copresence_relay={}", level.as_directive());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| directive.into()))
        .init();
    if let Some(Err(e)) = &config {
        tracing::warn!("Config load failed, using defaults: {e}");
    }

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("copresence-relay listening on {}", listener.local_addr()?);

    serve(listener, Hub::new()).await;
    Ok(())
}
