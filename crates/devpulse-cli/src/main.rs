//! Command-line interface for the DevPulse device management service.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use devpulse_api::ServerState;
use devpulse_core::config::{env_vars, Config};
use devpulse_ingest::{IngestServer, IngestServerConfig, LivenessSweeper};
use devpulse_storage::DeviceStore;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// DevPulse - collect and track device telemetry over raw TCP.
#[derive(Parser, Debug)]
#[command(name = "devpulse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the ingestion and API servers.
    Serve {
        /// Path to a TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// TCP ingestion port override.
        #[arg(long)]
        tcp_port: Option<u16>,

        /// HTTP API port override.
        #[arg(long)]
        http_port: Option<u16>,

        /// Database file override.
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Serve {
            config,
            tcp_port,
            http_port,
            db,
        } => serve(config, tcp_port, http_port, db).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // JSON logs for container environments, human-readable otherwise.
    if std::env::var(env_vars::LOG_JSON).is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn serve(
    config_path: Option<PathBuf>,
    tcp_port: Option<u16>,
    http_port: Option<u16>,
    db: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };
    if let Some(port) = tcp_port {
        config.tcp.port = port;
    }
    if let Some(port) = http_port {
        config.http.port = port;
    }
    if let Some(path) = db {
        config.storage.path = path.to_string_lossy().into_owned();
    }

    info!("starting DevPulse device management service");

    let store = DeviceStore::open_with_window(
        &config.storage.path,
        Duration::from_secs(config.liveness.freshness_secs),
    )?;
    info!(path = %config.storage.path, "database initialized");

    // Bind failures here are fatal; nothing else has started yet.
    let ingest =
        IngestServer::start(IngestServerConfig::from(&config.tcp), store.clone()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = LivenessSweeper::new(store.clone())
        .with_period(Duration::from_secs(config.liveness.sweep_secs))
        .spawn(shutdown_rx.clone());

    let state = ServerState::new(store.clone(), config.tcp.port, config.http.port);
    let http_addr = config.http.socket_addr()?;
    let http_handle = tokio::spawn(devpulse_api::run(http_addr, state, shutdown_rx));

    info!(
        tcp_port = config.tcp.port,
        http_port = config.http.port,
        "ready to receive device connections"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    // Ordered teardown: stop accepting and close connections, then the
    // sweeper, then the HTTP veneer, and only then release storage.
    ingest.stop().await;
    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;
    match http_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error during shutdown"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }
    drop(store);

    info!("shutdown complete");
    Ok(())
}
