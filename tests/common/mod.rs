//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use brickflow::ControlPeerConfig;
use std::future::Future;
use std::time::Duration;

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Control peer config suited to tests: ephemeral port, fast polling, no signal handlers
pub fn peer_config() -> ControlPeerConfig {
    let mut config = ControlPeerConfig::default();
    config.control.port = 0;
    config.control.install_signal_handlers = false;
    config.control.poll_interval_ms = 20;
    config.control.stop_timeout_ms = 1_000;
    config.control.registration_timeout_ms = 500;
    config.director.retry_delay_ms = 10;
    config.director.request_timeout_ms = 1_000;
    config
}

/// Poll `check` until it returns true, panicking with `what` after [`test_timeout`].
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + test_timeout();
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting until {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Run `fut` with [`test_timeout`], panicking with `what` if it does not finish.
pub async fn within<F: Future>(what: &str, fut: F) -> F::Output {
    tokio::time::timeout(test_timeout(), fut)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}
