//! Termination signal handling.

use super::ControlPeer;
use std::io;
use std::sync::Arc;

/// Stream of termination requests from the OS
pub(crate) struct Termination {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl Termination {
    #[cfg(unix)]
    pub(crate) fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next termination signal and return its name
    #[cfg(unix)]
    pub(crate) async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub(crate) async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending().await
            }
        }
    }
}

/// Shut `peer` down on the first SIGINT or SIGTERM.
///
/// The shutdown itself runs outside the task supervisor, which it joins.
pub(crate) fn install(peer: &Arc<ControlPeer>) -> io::Result<()> {
    let mut termination = Termination::install()?;
    let token = peer.tasks().child_token();
    let weak = Arc::downgrade(peer);

    peer.tasks().spawn("signal-handler", async move {
        tokio::select! {
            _ = token.cancelled() => {}
            name = termination.recv() => {
                tracing::info!("Received {}, shutting down", name);
                if let Some(peer) = weak.upgrade() {
                    tokio::spawn(async move { peer.shutdown().await });
                }
            }
        }
    });
    Ok(())
}
