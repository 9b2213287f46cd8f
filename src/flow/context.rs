//! Shared state handed to every brick and runner.

use super::id::RunnerId;
use super::lock;
use super::runner::BrickRunner;
use crate::process::RunnerLauncher;
use crate::tasks::TaskSupervisor;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Map of every live runner by uid.
///
/// Owned by the control peer, which uses it to route incoming connections.
/// Bricks insert runners before their subprocess starts and remove them once
/// the process has exited.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: Arc<Mutex<HashMap<RunnerId, Arc<BrickRunner>>>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, runner: Arc<BrickRunner>) {
        lock(&self.runners).insert(runner.id(), runner);
    }

    pub fn remove(&self, id: RunnerId) -> Option<Arc<BrickRunner>> {
        lock(&self.runners).remove(&id)
    }

    pub fn get(&self, id: RunnerId) -> Option<Arc<BrickRunner>> {
        lock(&self.runners).get(&id).cloned()
    }

    pub fn contains(&self, id: RunnerId) -> bool {
        lock(&self.runners).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.runners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<RunnerId> {
        lock(&self.runners).keys().copied().collect()
    }
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("runners", &self.len())
            .finish()
    }
}

/// Everything bricks need from the control peer
pub struct FlowContext {
    pub registry: RunnerRegistry,
    pub launcher: Arc<dyn RunnerLauncher>,
    pub tasks: Arc<TaskSupervisor>,
    /// `host:port` runners connect back to
    pub control_address: String,
    /// Data-plane bootstrap arguments passed to every runner
    pub bootstrap: Vec<String>,
    /// Interval between exit polls of a disconnected runner
    pub poll_interval: Duration,
    /// How long a stopping brick waits for its runners
    pub stop_timeout: Duration,
}

impl fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowContext")
            .field("registry", &self.registry)
            .field("control_address", &self.control_address)
            .field("bootstrap", &self.bootstrap)
            .field("poll_interval", &self.poll_interval)
            .field("stop_timeout", &self.stop_timeout)
            .finish_non_exhaustive()
    }
}
