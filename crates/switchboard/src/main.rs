//! # switchboard
//!
//! Signaling relay binary. `switchboard serve` (the default) runs the relay;
//! `switchboard connect` attaches a diagnostic client to a running relay.

#![deny(unsafe_code)]

mod client;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use switchboard_logging::LogConfig;
use switchboard_server::SwitchboardServer;

use crate::settings::SwitchboardSettings;

/// WebRTC call-signaling relay.
#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about = "WebRTC call-signaling relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Connect to a relay and print every event it sends.
    Connect(ConnectArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Settings file (default: `~/.switchboard/settings.json` if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,
}

impl ServeArgs {
    fn apply(&self, settings: &mut SwitchboardSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Relay WebSocket URL.
    #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    /// Identity to register as.
    #[arg(long)]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or_else(|| Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(args).await,
        Command::Connect(args) => connect(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut settings = settings::load(args.config.as_deref()).context("Failed to load settings")?;
    args.apply(&mut settings);

    switchboard_logging::init_subscriber(&settings.logging)
        .context("Failed to initialize logging")?;

    let metrics = switchboard_server::metrics::install_recorder();
    let server = SwitchboardServer::new(settings.server, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Switchboard listening on http://{addr} (ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server.shutdown().drain(handle, None).await;
    tracing::info!(drained, "Shutdown complete");
    Ok(())
}

async fn connect(args: ConnectArgs) -> Result<()> {
    let logging = LogConfig {
        level: "warn".into(),
        stderr: true,
        ..LogConfig::default()
    };
    switchboard_logging::init_subscriber(&logging).context("Failed to initialize logging")?;
    client::run(&args.url, args.user.as_deref()).await
}
