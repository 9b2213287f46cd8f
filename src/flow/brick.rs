//! A pipeline stage and its runners.
//!
//! A brick starts with one runner and scales up to `max_instances` when a
//! producer reports it as a slow consumer. It also relays the addresses of its
//! available runners to every downstream brick.

use super::connection::BrickConnection;
use super::context::FlowContext;
use super::error::{FlowError, FlowResult};
use super::id::{BrickId, RunnerId};
use super::lock;
use super::port::PortLink;
use super::runner::BrickRunner;
use super::snapshot::BrickSnapshot;
use crate::config::{BrickDefinition, BrickSettings};
use crate::protocol::{AssignmentContent, InputSource, OutputTarget};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct BrickLinks {
    inputs: Vec<BrickConnection>,
    outputs: Vec<BrickConnection>,
    /// Distinct connection targets in order of first appearance
    targets: Vec<Weak<Brick>>,
}

pub struct Brick {
    id: BrickId,
    name: String,
    module: String,
    parameters: serde_json::Value,
    settings: BrickSettings,
    ctx: Arc<FlowContext>,
    me: Weak<Brick>,
    links: OnceLock<BrickLinks>,
    runners: Mutex<Vec<Arc<BrickRunner>>>,
    runner_count: watch::Sender<usize>,
    stopping: AtomicBool,
}

impl Brick {
    pub(crate) fn new(
        def: &BrickDefinition,
        settings: BrickSettings,
        ctx: Arc<FlowContext>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id: BrickId::new(),
            name: def.name.clone(),
            module: def.module.clone(),
            parameters: serde_json::Value::Object(def.parameters.clone()),
            settings,
            ctx,
            me: me.clone(),
            links: OnceLock::new(),
            runners: Mutex::new(Vec::new()),
            runner_count: watch::Sender::new(0),
            stopping: AtomicBool::new(false),
        })
    }

    /// Install the brick's connections. Only the first call has an effect.
    pub(crate) fn connect(&self, inputs: Vec<BrickConnection>, outputs: Vec<BrickConnection>) {
        let mut targets: Vec<Weak<Brick>> = Vec::new();
        let mut seen = Vec::new();
        for conn in &outputs {
            if !seen.contains(&conn.target_name()) {
                seen.push(conn.target_name());
                targets.push(conn.target_weak().clone());
            }
        }

        let links = BrickLinks {
            targets,
            inputs,
            outputs,
        };
        if self.links.set(links).is_err() {
            tracing::warn!("Brick '{}' is already connected", self.name);
        }
    }

    pub fn id(&self) -> BrickId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn settings(&self) -> &BrickSettings {
        &self.settings
    }

    pub fn inputs(&self) -> &[BrickConnection] {
        self.links.get().map(|l| l.inputs.as_slice()).unwrap_or(&[])
    }

    pub fn outputs(&self) -> &[BrickConnection] {
        self.links.get().map(|l| l.outputs.as_slice()).unwrap_or(&[])
    }

    /// Distinct downstream bricks
    pub fn targets(&self) -> Vec<Arc<Brick>> {
        self.links
            .get()
            .map(|l| l.targets.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    pub fn runners(&self) -> Vec<Arc<BrickRunner>> {
        lock(&self.runners).clone()
    }

    pub fn runner_count(&self) -> usize {
        *self.runner_count.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Start the brick's initial runner
    pub fn start(&self) -> FlowResult<Arc<BrickRunner>> {
        self.stopping.store(false, Ordering::SeqCst);
        self.start_new_runner()
    }

    /// Launch one more runner, unless the brick is at its instance cap.
    ///
    /// The runner is registered before its process starts, so it can be found
    /// as soon as it connects back.
    pub fn start_new_runner(&self) -> FlowResult<Arc<BrickRunner>> {
        let me = self
            .me
            .upgrade()
            .ok_or_else(|| FlowError::BrickGone(self.name.clone()))?;
        if self.is_stopping() {
            return Err(FlowError::Stopping(self.name.clone()));
        }

        let runner = BrickRunner::new(&me, self.ctx.clone());
        {
            let mut runners = lock(&self.runners);
            if runners.len() >= self.settings.max_instances {
                return Err(FlowError::ScaleCapReached {
                    brick: self.name.clone(),
                    max_instances: self.settings.max_instances,
                });
            }
            runners.push(runner.clone());
            self.runner_count.send_replace(runners.len());
        }
        self.ctx.registry.insert(runner.clone());

        if let Err(e) = runner.start() {
            runner.mark_terminated();
            self.remove_runner(runner.id());
            return Err(e);
        }

        let watched = runner.clone();
        self.ctx.tasks.spawn("runner-exit-watch", async move {
            watched.watch_until_connected().await;
        });

        let announced = runner.clone();
        self.ctx.tasks.spawn("announce-runner", async move {
            me.announce_runner_to_targets(&announced).await;
        });
        Ok(runner)
    }

    /// Wait for `runner` to become available, then hand its address to every target.
    pub async fn announce_runner_to_targets(&self, runner: &BrickRunner) {
        let targets = self.targets();
        if targets.is_empty() {
            return;
        }

        if !runner.wait_until_available().await {
            tracing::debug!(
                "Runner {} of brick '{}' never became available, not announcing",
                runner.id(),
                self.name
            );
            return;
        }
        let Some(address) = runner.output_address() else {
            return;
        };

        for target in targets {
            tracing::debug!(
                "Announcing {} ({}) to brick '{}'",
                address,
                self.name,
                target.name()
            );
            target.add_input_source(self, address);
        }
    }

    /// Push a newly available producer of `source` to every runner of this brick.
    ///
    /// Best effort: with no runners the update is dropped. Runners started
    /// later pick the producer up from their assignment.
    pub fn add_input_source(&self, source: &Brick, address: &str) {
        let ports = links_by_peer(self.inputs(), Side::Source)
            .remove(source.name())
            .map(|(_, ports)| ports)
            .unwrap_or_default();
        if ports.is_empty() {
            tracing::debug!(
                "Brick '{}' has no input from '{}', ignoring {}",
                self.name,
                source.name(),
                address
            );
            return;
        }

        let runners = self.runners();
        if runners.is_empty() {
            tracing::debug!(
                "Brick '{}' has no runners, dropping input source {}",
                self.name,
                address
            );
            return;
        }

        let update = vec![InputSource {
            brick: source.name().to_string(),
            address: address.to_string(),
            ports,
        }];
        for runner in runners {
            let update = update.clone();
            self.ctx.tasks.spawn("input-source-update", async move {
                if let Err(e) = runner.update_input_sources(update).await {
                    tracing::debug!("Input source update for {} dropped: {}", runner.id(), e);
                }
            });
        }
    }

    /// Assignment for a new runner of this brick.
    ///
    /// Lists one input source per available upstream runner and one output
    /// target per distinct downstream brick.
    pub fn create_assignment(&self) -> AssignmentContent {
        let mut input_sources = Vec::new();
        for (name, (source, ports)) in links_by_peer(self.inputs(), Side::Source) {
            let Some(source) = source.upgrade() else {
                continue;
            };
            for runner in source.runners() {
                if !runner.is_available() {
                    continue;
                }
                if let Some(address) = runner.output_address() {
                    input_sources.push(InputSource {
                        brick: name.clone(),
                        address: address.to_string(),
                        ports: ports.clone(),
                    });
                }
            }
        }

        let output_targets = links_by_peer(self.outputs(), Side::Target)
            .into_iter()
            .filter_map(|(name, (target, ports))| {
                let target = target.upgrade()?;
                Some(OutputTarget {
                    brick: name,
                    ports,
                    scale_threshold: target.settings.scale_threshold,
                })
            })
            .collect();

        AssignmentContent {
            brick: self.name.clone(),
            module: self.module.clone(),
            parameters: self.parameters.clone(),
            idle_timeout_secs: self.settings.idle_timeout_secs,
            input_sources,
            output_targets,
        }
    }

    /// A runner of this brick reports `target_name` as too slow
    pub fn handle_slow_consumer(&self, target_name: &str) {
        match self.targets().into_iter().find(|t| t.name() == target_name) {
            Some(target) => {
                tracing::info!(
                    "Brick '{}' reports slow consumer '{}'",
                    self.name,
                    target_name
                );
                // Refusals are logged by scale()
                let _ = target.scale();
            }
            None => tracing::warn!(
                "Brick '{}' reported unknown slow consumer '{}'",
                self.name,
                target_name
            ),
        }
    }

    /// Add one runner, refusing at the instance cap
    pub fn scale(&self) -> FlowResult<Arc<BrickRunner>> {
        match self.start_new_runner() {
            Ok(runner) => {
                tracing::info!(
                    "Scaled brick '{}' to {} runners",
                    self.name,
                    self.runner_count()
                );
                Ok(runner)
            }
            Err(e @ FlowError::ScaleCapReached { .. }) | Err(e @ FlowError::Stopping(_)) => {
                tracing::info!("Not scaling: {}", e);
                Err(e)
            }
            Err(e) => {
                tracing::warn!("Failed to scale brick '{}': {}", self.name, e);
                Err(e)
            }
        }
    }

    /// Forget a runner. Returns `false` if it was already gone.
    pub fn remove_runner(&self, id: RunnerId) -> bool {
        let removed = {
            let mut runners = lock(&self.runners);
            let before = runners.len();
            runners.retain(|r| r.id() != id);
            self.runner_count.send_replace(runners.len());
            runners.len() != before
        };
        self.ctx.registry.remove(id);
        if removed {
            tracing::debug!("Removed runner {} from brick '{}'", id, self.name);
        }
        removed
    }

    /// Stop every runner and wait for them to go away.
    ///
    /// Runners still present after the stop timeout are killed and removed.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let runners = self.runners();
        if runners.is_empty() {
            return;
        }

        tracing::debug!("Stopping {} runners of brick '{}'", runners.len(), self.name);
        for runner in &runners {
            runner.stop();
        }

        let mut count = self.runner_count.subscribe();
        let drained =
            tokio::time::timeout(self.ctx.stop_timeout, count.wait_for(|n| *n == 0)).await;
        if drained.is_err() {
            for runner in self.runners() {
                tracing::warn!(
                    "Runner {} of brick '{}' did not exit in {:?}, killing it",
                    runner.id(),
                    self.name,
                    self.ctx.stop_timeout
                );
                runner.kill();
                runner.mark_terminated();
                self.remove_runner(runner.id());
            }
        }
    }

    pub fn snapshot(&self) -> BrickSnapshot {
        BrickSnapshot {
            id: self.id,
            name: self.name.clone(),
            module: self.module.clone(),
            max_instances: self.settings.max_instances,
            scale_threshold: self.settings.scale_threshold,
            idle_timeout_secs: self.settings.idle_timeout_secs,
            targets: self.targets().iter().map(|t| t.name.clone()).collect(),
            runners: self.runners().iter().map(|r| r.snapshot()).collect(),
        }
    }
}

impl fmt::Debug for Brick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Brick")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("module", &self.module)
            .field("runners", &self.runner_count())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Target,
}

/// Group connections by the brick on `side`, collecting their port pairs.
fn links_by_peer(
    connections: &[BrickConnection],
    side: Side,
) -> BTreeMap<String, (Weak<Brick>, Vec<PortLink>)> {
    let mut grouped: BTreeMap<String, (Weak<Brick>, Vec<PortLink>)> = BTreeMap::new();
    for conn in connections {
        let (name, peer) = match side {
            Side::Source => (conn.source_name(), conn.source().map(|b| Arc::downgrade(&b))),
            Side::Target => (conn.target_name(), Some(conn.target_weak().clone())),
        };
        let entry = grouped
            .entry(name.to_string())
            .or_insert_with(|| (peer.unwrap_or_default(), Vec::new()));
        let link = conn.port_link();
        if !entry.1.contains(&link) {
            entry.1.push(link);
        }
    }
    grouped
}
