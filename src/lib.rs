//! # brickflow: control plane for brick dataflow pipelines
//!
//! A control peer reads a pipeline topology (named processing stages called
//! *bricks*, joined by directed *connections*), launches one runner subprocess
//! per brick and wires producers to consumers as their runners come online.
//! When a producer reports a slow consumer, the consumer brick is scaled up to
//! its instance cap.
//!
//! ## Architecture
//!
//! - **Peer**: [`ControlPeer`] owns all flows and the TCP control channel
//! - **Flow**: [`Flow`] → [`Brick`] → [`BrickRunner`], one runner per subprocess
//! - **Protocol**: length-framed JSON [`ControlMessage`]s between peer and runners
//! - **Director**: [`FlowDirector`] clients that register the peer and serve topology
//! - **Tasks**: every background task runs in a [`TaskSupervisor`]
//!
//! ## Configuration
//!
//! The control peer reads `control-peer.toml` from the platform config
//! directory under `brickflow` unless a path is given:
//!
//! - **Linux**: `~/.config/brickflow/`
//! - **macOS**: `~/Library/Application Support/brickflow/`
//! - **Windows**: `%APPDATA%\brickflow\`
//!
//! ## Example
//!
//! ```ignore
//! use brickflow::{config::ControlPeerConfig, director, process::SubprocessLauncher, ControlPeer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ControlPeerConfig::load_or_default(None);
//!     let director = director::from_config(&config.director)?;
//!     let launcher = Arc::new(SubprocessLauncher::from_config(&config.runner));
//!
//!     let peer = ControlPeer::new(config, director, launcher);
//!     peer.setup().await?;
//!     peer.run().await?;
//!     peer.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod director;
pub mod error;
pub mod flow;
pub mod logging;
pub mod peer;
pub mod process;
pub mod protocol;
pub mod tasks;

// Re-export commonly used types
pub use config::{ControlPeerConfig, Topology};
pub use director::{FlowDirector, HttpFlowDirector, StaticFlowDirector};
pub use error::{BrickflowError, Result};
pub use flow::{Brick, BrickRunner, Flow, FlowState, RunnerId};
pub use peer::ControlPeer;
pub use process::{RunnerLauncher, SubprocessLauncher};
pub use protocol::ControlMessage;
pub use tasks::TaskSupervisor;
