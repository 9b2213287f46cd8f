//! Topology documents describing flows, their bricks and the links between them.
//!
//! The flow director serves this structure as JSON. The same structure can be
//! loaded from a local TOML or JSON file for running without a director.

use super::BrickDefaults;
use crate::error::{BrickflowError, Result};
use crate::flow::FlowError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// All flows known to the director
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
}

impl Topology {
    /// Find a flow definition by name
    pub fn find(&self, name: &str) -> Option<&FlowDefinition> {
        self.flows.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Load a topology file. `.json` files are read as JSON, everything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BrickflowError::Config(format!("Failed to read topology file {:?}: {}", path, e))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content).map_err(|e| {
                BrickflowError::Config(format!("Failed to parse topology {:?}: {}", path, e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                BrickflowError::Config(format!("Failed to parse topology {:?}: {}", path, e))
            })
        }
    }
}

/// One pipeline: its bricks and the connections between them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub name: String,

    /// Idle timeout applied to bricks that do not set their own
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    #[serde(default)]
    pub bricks: Vec<BrickDefinition>,

    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,
}

impl FlowDefinition {
    pub fn brick(&self, name: &str) -> Option<&BrickDefinition> {
        self.bricks.iter().find(|b| b.name == name)
    }

    /// Check brick names, instance caps and connection endpoints.
    pub fn validate(&self) -> std::result::Result<(), FlowError> {
        let mut names = HashSet::new();
        for brick in &self.bricks {
            if !names.insert(brick.name.as_str()) {
                return Err(self.config_error(format!("duplicate brick name '{}'", brick.name)));
            }
            if brick.max_instances == Some(0) {
                return Err(self.config_error(format!(
                    "brick '{}' has max_instances = 0",
                    brick.name
                )));
            }
        }

        for conn in &self.connections {
            for endpoint in [&conn.source, &conn.target] {
                if !names.contains(endpoint.as_str()) {
                    return Err(self.config_error(format!(
                        "connection {} -> {} references unknown brick '{}'",
                        conn.source, conn.target, endpoint
                    )));
                }
            }
        }

        Ok(())
    }

    fn config_error(&self, message: String) -> FlowError {
        FlowError::Config {
            flow: self.name.clone(),
            message,
        }
    }
}

/// One processing stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickDefinition {
    pub name: String,

    /// Business module the runner executes
    pub module: String,

    /// Free-form module parameters, passed through untouched
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub max_instances: Option<usize>,

    #[serde(default)]
    pub scale_threshold: Option<u32>,

    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl BrickDefinition {
    /// Resolve per-brick settings: brick value, then flow value, then defaults.
    pub fn resolve(&self, flow: &FlowDefinition, defaults: &BrickDefaults) -> BrickSettings {
        BrickSettings {
            max_instances: self.max_instances.unwrap_or(defaults.max_instances),
            scale_threshold: self.scale_threshold.unwrap_or(defaults.scale_threshold),
            idle_timeout_secs: self
                .idle_timeout_secs
                .or(flow.idle_timeout_secs)
                .unwrap_or(defaults.idle_timeout_secs),
        }
    }
}

/// Effective settings of a brick after defaults are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrickSettings {
    pub max_instances: usize,
    pub scale_threshold: u32,
    pub idle_timeout_secs: u64,
}

impl BrickSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for BrickSettings {
    fn default() -> Self {
        let defaults = BrickDefaults::default();
        Self {
            max_instances: defaults.max_instances,
            scale_threshold: defaults.scale_threshold,
            idle_timeout_secs: defaults.idle_timeout_secs,
        }
    }
}

/// Directed link between two bricks of the same flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    pub source: String,
    pub target: String,

    #[serde(default)]
    pub source_port: Option<String>,

    #[serde(default)]
    pub target_port: Option<String>,
}
