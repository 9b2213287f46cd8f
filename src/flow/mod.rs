//! Flows, bricks and the runner processes that execute them.
//!
//! A [`Flow`] is built from a [`FlowDefinition`](crate::config::FlowDefinition):
//! every brick becomes a [`Brick`], every connection a [`BrickConnection`].
//! Each brick owns one or more [`BrickRunner`]s, one per live subprocess.
//!
//! # Architecture
//!
//! ```text
//! Flow ──owns──► Brick ──owns──► BrickRunner ──► subprocess
//!                  │  ▲               │
//!         targets  │  │ Weak          │ control channel (TCP)
//!                  ▼  │               ▼
//!                Brick ◄──────── ControlPeer
//! ```
//!
//! # Ordering
//!
//! - A runner's output address reaches downstream bricks only after the
//!   runner has been sent its assignment and marked available.
//! - Assignments list only upstream runners that are already available.
//!   Later producers arrive through `input_source_update` messages.

pub mod brick;
pub mod connection;
pub mod context;
pub mod error;
pub mod graph;
pub mod id;
pub mod port;
pub mod runner;
pub mod snapshot;

pub use brick::Brick;
pub use connection::BrickConnection;
pub use context::{FlowContext, RunnerRegistry};
pub use error::{FlowError, FlowResult};
pub use graph::{Flow, FlowState};
pub use id::{BrickId, FlowId, RunnerId};
pub use port::{port_or_default, PortLink, DEFAULT_PORT};
pub use runner::{BrickRunner, RunnerState, StopOutcome};
pub use snapshot::{BrickSnapshot, FlowSnapshot, RunnerSnapshot};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
