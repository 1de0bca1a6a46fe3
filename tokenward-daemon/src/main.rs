//! Tokenward Daemon
//!
//! Background service that keeps one fresh token per configured
//! credential and serves them to local clients over a Unix socket.
//!
//! # Running
//!
//! ```bash
//! cargo run -p tokenward-daemon
//! # or after install:
//! tokenwardd --config /etc/tokenward/tokenward.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokenward_core::{RefreshEvent, TokenKeeper};
use tokenward_daemon::{api, config, sources};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Credential cache and refresh daemon.
#[derive(Debug, Parser)]
#[command(name = "tokenwardd", version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Unix socket to listen on (overrides the configuration file)
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = config::load_config(args.config)?;
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    init_logging(&config.log_level);

    info!("Starting Tokenward daemon...");
    info!("Loaded configuration from {:?}", config.config_path);

    run_daemon(config).await
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_daemon(config: config::DaemonConfig) -> Result<()> {
    info!("Daemon starting on {:?}", config.socket_path);

    let keeper = Arc::new(TokenKeeper::new());
    let mut events = keeper.subscribe();

    for credential in &config.credentials {
        let source = sources::build_source(&credential.source);
        keeper
            .start(credential.name.clone(), source, credential.refresh_config())
            .await
            .with_context(|| format!("Failed to start refresher for '{}'", credential.name))?;
    }
    info!("Managing {} credential(s)", config.credentials.len());

    // Start the JSON-RPC server
    let state = api::ApiState::new(Arc::clone(&keeper));
    let server_handle = api::start_server(&config.socket_path, state).await?;

    info!("Daemon running. Press Ctrl+C to stop.");

    // Run until interrupted, or until a refresher exhausts its retry
    // budget. A fatal refresher means a credential this daemon was asked
    // to keep warm can no longer be refreshed; exiting non-zero lets a
    // supervisor restart us with a fresh budget.
    let fatal = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received, stopping server...");
                break None;
            }
            event = events.recv() => match event {
                Ok(RefreshEvent::RefresherStopped { name, error }) => {
                    error!("Refresher for '{}' gave up: {}", name, error);
                    break Some((name, error));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break None,
            },
        }
    };

    // Stop the server gracefully, then the refreshers
    server_handle.stop().await?;
    keeper.shutdown().await;

    // Clean up socket file
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
        info!("Socket file removed");
    }

    if let Some((name, error)) = fatal {
        anyhow::bail!("refresher for '{}' gave up: {}", name, error);
    }

    info!("Daemon stopped");
    Ok(())
}
