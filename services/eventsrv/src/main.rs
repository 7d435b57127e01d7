//! EventSrv entry point
//!
//! Runs the HTTP API and the queue worker, together or on their own.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eventsrv::{create_app_state, serve_http, AppState, EventsrvConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "EventSrv - device event ingestion and alerting")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API and the queue worker (default)
    Serve,

    /// Start API server only
    Api,

    /// Run the queue worker only
    Worker,

    /// Validate configuration and storage, then print the effective config
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = EventsrvConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    common::logging::init_with_config(config.log_config())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Starting {} v{}",
        config.service.name,
        env!("CARGO_PKG_VERSION")
    );

    match args.command {
        Some(Commands::Serve) | None => run_service(&config).await,
        Some(Commands::Api) => run_api(&config).await,
        Some(Commands::Worker) => run_worker(&config).await,
        Some(Commands::Check) => check_config(&config).await,
    }
}

/// HTTP server and queue worker until a shutdown signal
async fn run_service(config: &EventsrvConfig) -> Result<()> {
    let state = create_app_state(config).await?;
    let token = common::shutdown::shutdown_token();

    let worker = spawn_worker(&state, token.clone());
    let served = serve_http(state, token.clone()).await;

    // The server may have stopped on its own; make sure the worker follows
    token.cancel();
    if let Err(e) = worker.await {
        error!("Queue worker task failed: {}", e);
    }

    served?;
    info!("Service shutdown complete");
    Ok(())
}

async fn run_api(config: &EventsrvConfig) -> Result<()> {
    let state = create_app_state(config).await?;
    serve_http(state, common::shutdown::shutdown_token()).await?;
    Ok(())
}

async fn run_worker(config: &EventsrvConfig) -> Result<()> {
    let state = create_app_state(config).await?;
    let token = common::shutdown::shutdown_token();
    spawn_worker(&state, token).await?;
    Ok(())
}

fn spawn_worker(state: &Arc<AppState>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
    let worker = state.worker();
    tokio::spawn(async move { worker.run(token).await })
}

async fn check_config(config: &EventsrvConfig) -> Result<()> {
    config.validate()?;

    let state = create_app_state(config).await?;
    state
        .rules
        .ping()
        .await
        .context("Storage is not reachable")?;
    let stats = state.queue.stats().await?;

    println!("Configuration OK");
    println!(
        "Queue: {} pending, {} in flight, {} dead-lettered",
        stats.pending, stats.in_flight, stats.dead_letter
    );
    println!("---");
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
