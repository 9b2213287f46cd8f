//! Read-only views of flows for status reporting.

use super::graph::FlowState;
use super::id::{BrickId, FlowId, RunnerId};
use super::runner::RunnerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub id: FlowId,
    pub name: String,
    pub state: FlowState,
    pub bricks: Vec<BrickSnapshot>,
}

impl FlowSnapshot {
    pub fn brick(&self, name: &str) -> Option<&BrickSnapshot> {
        self.bricks.iter().find(|b| b.name == name)
    }

    /// Total runners across all bricks
    pub fn runner_count(&self) -> usize {
        self.bricks.iter().map(|b| b.runners.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickSnapshot {
    pub id: BrickId,
    pub name: String,
    pub module: String,
    pub max_instances: usize,
    pub scale_threshold: u32,
    pub idle_timeout_secs: u64,
    /// Names of downstream bricks
    pub targets: Vec<String>,
    pub runners: Vec<RunnerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSnapshot {
    pub id: RunnerId,
    pub state: RunnerState,
    pub available: bool,
    pub output_address: Option<String>,
    /// Number of input sources the runner has been told about
    pub known_sources: usize,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}
