//! brickflow control peer - Main Entry Point
//!
//! Registers with the flow director, starts the flows it serves and
//! supervises their runner processes until SIGINT or SIGTERM.

use anyhow::Context;
use brickflow::{
    config::{self, ControlPeerConfig},
    director, logging,
    process::SubprocessLauncher,
    ControlPeer,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "brickflow-control-peer", version, about)]
struct Cli {
    /// Control peer configuration file
    #[arg(long, env = "BRICKFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Flow director base URL (overrides the config file)
    #[arg(long)]
    director: Option<String>,

    /// Local topology file used instead of a director
    #[arg(long, conflicts_with = "director")]
    topology: Option<PathBuf>,

    /// Control channel port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn apply(&self, config: &mut ControlPeerConfig) {
        if let Some(url) = &self.director {
            config.director.url = Some(url.clone());
            config.director.topology_file = None;
        }
        if let Some(path) = &self.topology {
            config.director.url = None;
            config.director.topology_file = Some(path.clone());
        }
        if let Some(port) = self.port {
            config.control.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ControlPeerConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => ControlPeerConfig::load_or_default(None),
    };
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let _log_guard = logging::init(&config.logging).context("Failed to initialize logging")?;
    tracing::info!(
        "Starting brickflow control peer (config dir {:?})",
        config::config_dir()
    );

    let director = director::from_config(&config.director).context("No usable flow director")?;
    let launcher = Arc::new(SubprocessLauncher::from_config(&config.runner));

    let peer = ControlPeer::new(config, director, launcher);
    peer.setup().await.context("Failed to set up control peer")?;

    let result = peer.run().await;
    peer.shutdown().await;
    result.context("Control peer failed")?;

    tracing::info!("Exiting");
    Ok(())
}
