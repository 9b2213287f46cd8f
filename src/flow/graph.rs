//! A complete pipeline: bricks wired by their connections.

use super::brick::Brick;
use super::connection::BrickConnection;
use super::context::FlowContext;
use super::error::{FlowError, FlowResult};
use super::id::FlowId;
use super::lock;
use super::snapshot::FlowSnapshot;
use crate::config::{BrickDefaults, FlowDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Lifecycle state of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    Inactive,
    Active,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Inactive => f.write_str("INACTIVE"),
            FlowState::Active => f.write_str("ACTIVE"),
        }
    }
}

pub struct Flow {
    id: FlowId,
    name: String,
    state: Mutex<FlowState>,
    stopping: AtomicBool,
    bricks: Vec<Arc<Brick>>,
}

impl Flow {
    /// Build a flow from its definition.
    ///
    /// Every connection is resolved to its source and target brick; each brick
    /// receives the connections ending at it (inputs) and starting at it
    /// (outputs).
    pub fn build(
        def: &FlowDefinition,
        defaults: &BrickDefaults,
        ctx: Arc<FlowContext>,
    ) -> FlowResult<Arc<Self>> {
        def.validate()?;

        let bricks: Vec<Arc<Brick>> = def
            .bricks
            .iter()
            .map(|b| Brick::new(b, b.resolve(def, defaults), ctx.clone()))
            .collect();
        let by_name: HashMap<&str, &Arc<Brick>> =
            bricks.iter().map(|b| (b.name(), b)).collect();

        let mut inputs: HashMap<String, Vec<BrickConnection>> = HashMap::new();
        let mut outputs: HashMap<String, Vec<BrickConnection>> = HashMap::new();
        for conn in &def.connections {
            let resolve = |name: &str| {
                by_name.get(name).copied().ok_or_else(|| FlowError::Config {
                    flow: def.name.clone(),
                    message: format!("connection references unknown brick '{}'", name),
                })
            };
            let source = resolve(&conn.source)?;
            let target = resolve(&conn.target)?;

            let link = BrickConnection::new(source, target, conn);
            outputs
                .entry(conn.source.clone())
                .or_default()
                .push(link.clone());
            inputs.entry(conn.target.clone()).or_default().push(link);
        }

        for brick in &bricks {
            brick.connect(
                inputs.remove(brick.name()).unwrap_or_default(),
                outputs.remove(brick.name()).unwrap_or_default(),
            );
        }

        tracing::debug!(
            "Built flow '{}' with {} bricks and {} connections",
            def.name,
            bricks.len(),
            def.connections.len()
        );

        Ok(Arc::new(Self {
            id: FlowId::new(),
            name: def.name.clone(),
            state: Mutex::new(FlowState::Inactive),
            stopping: AtomicBool::new(false),
            bricks,
        }))
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FlowState {
        *lock(&self.state)
    }

    pub fn is_active(&self) -> bool {
        self.state() == FlowState::Active
    }

    pub fn bricks(&self) -> &[Arc<Brick>] {
        &self.bricks
    }

    pub fn brick(&self, name: &str) -> Option<Arc<Brick>> {
        self.bricks.iter().find(|b| b.name() == name).cloned()
    }

    /// Activate the flow and start one runner per brick.
    ///
    /// Returns `false` without doing anything if the flow is already active or
    /// still stopping.
    pub fn start(&self) -> bool {
        {
            let mut state = lock(&self.state);
            if *state == FlowState::Active {
                tracing::debug!("Flow '{}' is already active", self.name);
                return false;
            }
            if self.stopping.load(Ordering::SeqCst) {
                tracing::warn!("Flow '{}' is still stopping, not starting it", self.name);
                return false;
            }
            *state = FlowState::Active;
        }

        tracing::info!("Starting flow '{}'", self.name);
        for brick in &self.bricks {
            if let Err(e) = brick.start() {
                tracing::error!(
                    "Flow '{}': failed to start brick '{}': {}",
                    self.name,
                    brick.name(),
                    e
                );
            }
        }
        true
    }

    /// Stop every brick concurrently and mark the flow inactive.
    ///
    /// Returns `false` if the flow was not active or another stop is running.
    pub async fn stop(&self) -> bool {
        if self.stopping.swap(true, Ordering::SeqCst) {
            tracing::debug!("Flow '{}' is already stopping", self.name);
            return false;
        }
        if !self.is_active() {
            self.stopping.store(false, Ordering::SeqCst);
            return false;
        }

        tracing::info!("Stopping flow '{}'", self.name);
        futures::future::join_all(self.bricks.iter().map(|b| b.stop())).await;

        *lock(&self.state) = FlowState::Inactive;
        self.stopping.store(false, Ordering::SeqCst);
        tracing::info!("Flow '{}' stopped", self.name);
        true
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            id: self.id,
            name: self.name.clone(),
            state: self.state(),
            bricks: self.bricks.iter().map(|b| b.snapshot()).collect(),
        }
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("bricks", &self.bricks.len())
            .finish()
    }
}
