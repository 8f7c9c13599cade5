//! Command-line entry point for the `parleyd` binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address (127.0.0.1:50051)
//! parleyd
//!
//! # Listen on all interfaces
//! parleyd --listen 0.0.0.0:50051
//! PARLEY_LISTEN=0.0.0.0:50051 parleyd
//!
//! # Use a specific config file
//! parleyd --config /etc/parley/parleyd.toml
//!
//! # Enable debug logging
//! RUST_LOG=parleyd=debug parleyd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::registry::ServerState;
use crate::server::ChatServer;

/// parley daemon - multi-room chat server
#[derive(Parser, Debug)]
#[command(name = "parleyd", version, about)]
pub struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long, env = "PARLEY_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Maximum simultaneous connections (overrides the config file)
    #[arg(long)]
    pub max_connections: Option<usize>,
}

impl Args {
    /// Loads the file layer and applies command-line overrides on top.
    pub fn resolve_config(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::resolve(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Parses arguments and runs the daemon until a shutdown signal arrives.
pub fn main() -> Result<()> {
    let args = Args::parse();
    run_daemon(args)
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(args: Args) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parleyd=info".parse()?)
                .add_directive("parley_protocol=info".parse()?),
        )
        .init();

    let config = args.resolve_config()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        listen = %config.listen,
        max_connections = config.max_connections,
        "parley daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let state = Arc::new(ServerState::new());
    let server = ChatServer::new(config, state, cancel_token);

    server.run().await.context("Server error")?;

    info!("parley daemon stopped");
    Ok(())
}

/// Waits for SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
