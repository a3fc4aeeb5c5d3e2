//! Tandem demo server entry point.
//!
//! Loads the configuration, starts a [`NetworkServer`] with the demo
//! [`Lobby`] attached, and runs the tick loop on the main task until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! tandem-server [OPTIONS]
//!
//! Options:
//!   --config  <PATH>   TOML config file [default: tandem-server.toml]
//!   --address <IP>     Bind address (overrides the file)
//!   --port    <PORT>   TCP + UDP port (overrides the file)
//!   --limit   <N>      Maximum concurrent clients (overrides the file)
//! ```
//!
//! Each option can also come from the environment (`TANDEM_CONFIG`,
//! `TANDEM_ADDRESS`, `TANDEM_PORT`, `TANDEM_LIMIT`).  `RUST_LOG` overrides
//! the configured log level.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tandem_server::application::lobby::Lobby;
use tandem_server::{load_config, NetworkServer, ServerConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Tandem dual-transport game server.
#[derive(Debug, Parser)]
#[command(name = "tandem-server", about = "Dual-transport (TCP + UDP) demo game server", version)]
struct Cli {
    /// Path to the TOML configuration file.  Missing files mean defaults.
    #[arg(long, default_value = "tandem-server.toml", env = "TANDEM_CONFIG")]
    config: PathBuf,

    /// IP address to bind both sockets to.
    #[arg(long, env = "TANDEM_ADDRESS")]
    address: Option<String>,

    /// Port shared by the TCP listener and the UDP socket.
    #[arg(long, env = "TANDEM_PORT")]
    port: Option<u16>,

    /// Maximum number of simultaneously connected clients.
    #[arg(long, env = "TANDEM_LIMIT")]
    limit: Option<usize>,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        if let Some(address) = self.address {
            config.bind_address = address;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(limit) = self.limit {
            config.limit_of_connections = limit;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_server_config()?;

    // `RUST_LOG` wins; otherwise use the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Tandem server starting");

    let tick_interval = config.tick_interval();
    let lobby = Arc::new(Lobby::new(config.spawn_position, config.tick_rate_hz));
    let server = NetworkServer::new(config);
    let addr = server.start().await.context("failed to start server")?;
    server.attach(lobby);

    info!("Tandem server ready on {addr}.  Press Ctrl-C to exit.");

    // ── Tick loop ─────────────────────────────────────────────────────────────
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                server.tick();
            }
            signal = &mut shutdown => {
                match signal {
                    Ok(()) => info!("received Ctrl+C; shutting down"),
                    Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
                }
                break;
            }
        }
    }

    server.shutdown();
    // Deliver callbacks raised by the shutdown itself.
    server.tick();
    info!("Tandem server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
