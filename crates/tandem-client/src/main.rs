//! Tandem demo client entry point.
//!
//! Connects to a server, attaches the [`DemoPlayer`] and runs the tick loop
//! until Ctrl+C or until the server drops the connection.  Once the
//! handshake completes, one input update goes out over UDP every tick.
//!
//! # Usage
//!
//! ```text
//! tandem-client [OPTIONS]
//!
//! Options:
//!   --config   <PATH>  TOML config file [default: tandem-client.toml]
//!   --address  <HOST>  Server host name or IP (overrides the file)
//!   --port     <PORT>  Server port (overrides the file)
//!   --username <NAME>  Name sent in the handshake (overrides the file)
//! ```
//!
//! Environment: `TANDEM_CLIENT_CONFIG`, `TANDEM_SERVER_ADDRESS`,
//! `TANDEM_PORT`, `TANDEM_USERNAME`.  `RUST_LOG` overrides the log level.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tandem_client::application::demo::DemoPlayer;
use tandem_client::{load_config, ClientConfig, NetworkClient};
use tandem_core::HandshakeState;

/// Tandem dual-transport demo client.
#[derive(Debug, Parser)]
#[command(name = "tandem-client", about = "Dual-transport (TCP + UDP) demo game client", version)]
struct Cli {
    /// Path to the TOML configuration file.  Missing files mean defaults.
    #[arg(long, default_value = "tandem-client.toml", env = "TANDEM_CLIENT_CONFIG")]
    config: PathBuf,

    /// Server host name or IP address.
    #[arg(long, env = "TANDEM_SERVER_ADDRESS")]
    address: Option<String>,

    #[arg(long, env = "TANDEM_PORT")]
    port: Option<u16>,

    /// Name announced to the server.
    #[arg(long, env = "TANDEM_USERNAME")]
    username: Option<String>,
}

impl Cli {
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        if let Some(address) = self.address {
            config.server_address = address;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(username) = self.username {
            config.username = username;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_client_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let tick_interval = config.tick_interval();
    let client = NetworkClient::new(config);
    let demo = Arc::new(DemoPlayer::new());
    client.attach(Arc::clone(&demo));
    let server = client.connect().await.context("failed to connect")?;
    info!("connected to {server}; waiting for the handshake.  Press Ctrl-C to exit.");

    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                client.tick();
                match client.state() {
                    HandshakeState::Active => {
                        demo.send_input(&client, tick);
                        tick += 1;
                    }
                    HandshakeState::Disconnected => {
                        warn!("connection to server lost");
                        break;
                    }
                    _ => {}
                }
            }
            signal = &mut shutdown => {
                match signal {
                    Ok(()) => info!("received Ctrl+C; disconnecting"),
                    Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
                }
                break;
            }
        }
    }

    client.disconnect();
    client.tick();
    info!("Tandem client stopped");
    Ok(())
}
