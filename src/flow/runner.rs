//! Handle to one runner subprocess of a brick.
//!
//! A runner moves through `Starting → Registered → Assigned → Available →
//! Terminated`. The control connection is owned by [`BrickRunner::process_messages`];
//! other tasks reach the runner through an outbox channel that the connection
//! loop drains.

use super::brick::Brick;
use super::context::FlowContext;
use super::error::{FlowError, FlowResult};
use super::id::RunnerId;
use super::lock;
use super::snapshot::RunnerSnapshot;
use crate::process::{LaunchRequest, ProcessExit, RunnerProcess};
use crate::protocol::{ControlCodec, ControlMessage, InputSource, ProtocolError};
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

/// Protocol state of a runner. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    Starting,
    Registered,
    Assigned,
    Available,
    Terminated,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerState::Starting => "starting",
            RunnerState::Registered => "registered",
            RunnerState::Assigned => "assigned",
            RunnerState::Available => "available",
            RunnerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What [`BrickRunner::stop`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A stop was already requested, or the runner is gone
    AlreadyStopping,
    /// `terminate` was queued on the control connection
    TerminateSent,
    /// The runner had no connection, so its process was killed
    Killed,
}

pub struct BrickRunner {
    id: RunnerId,
    brick: Weak<Brick>,
    brick_name: String,
    ctx: Arc<FlowContext>,
    state: watch::Sender<RunnerState>,
    available: watch::Sender<bool>,
    output_address: OnceLock<String>,
    known_sources: Mutex<HashSet<InputSource>>,
    process: Mutex<Option<Box<dyn RunnerProcess>>>,
    outbox: Mutex<Option<mpsc::UnboundedSender<ControlMessage>>>,
    connected: AtomicBool,
    stop_requested: AtomicBool,
    exit_handled: AtomicBool,
    started_at: DateTime<Utc>,
}

impl BrickRunner {
    pub(crate) fn new(brick: &Arc<Brick>, ctx: Arc<FlowContext>) -> Arc<Self> {
        Arc::new(Self {
            id: RunnerId::new(),
            brick: Arc::downgrade(brick),
            brick_name: brick.name().to_string(),
            ctx,
            state: watch::Sender::new(RunnerState::Starting),
            available: watch::Sender::new(false),
            output_address: OnceLock::new(),
            known_sources: Mutex::new(HashSet::new()),
            process: Mutex::new(None),
            outbox: Mutex::new(None),
            connected: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            exit_handled: AtomicBool::new(false),
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> RunnerId {
        self.id
    }

    pub fn brick_name(&self) -> &str {
        &self.brick_name
    }

    pub fn brick(&self) -> Option<Arc<Brick>> {
        self.brick.upgrade()
    }

    pub fn state(&self) -> RunnerState {
        *self.state.borrow()
    }

    pub fn is_available(&self) -> bool {
        *self.available.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Address the runner announced, once it has asked for an assignment
    pub fn output_address(&self) -> Option<&str> {
        self.output_address.get().map(String::as_str)
    }

    /// Input sources the runner has been told about
    pub fn known_sources(&self) -> HashSet<InputSource> {
        lock(&self.known_sources).clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn advance(&self, next: RunnerState) {
        self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn mark_terminated(&self) {
        self.advance(RunnerState::Terminated);
    }

    /// Spawn the runner's subprocess.
    ///
    /// Fails when the launch fails or the process has already exited with a
    /// non-zero or unknown status. The failure only affects this runner.
    pub fn start(&self) -> FlowResult<()> {
        let request = LaunchRequest {
            runner_id: self.id,
            brick: self.brick_name.clone(),
            control_address: self.ctx.control_address.clone(),
            bootstrap: self.ctx.bootstrap.clone(),
        };

        let launch_error = |message: String| FlowError::Launch {
            brick: self.brick_name.clone(),
            message,
        };

        let mut process = self
            .ctx
            .launcher
            .launch(&request)
            .map_err(|e| launch_error(e.to_string()))?;

        match process.try_wait() {
            Ok(None) => {}
            Ok(Some(exit)) if !exit.success() => {
                return Err(launch_error(format!("runner exited immediately ({})", exit)))
            }
            Ok(Some(_)) => {}
            Err(e) => return Err(launch_error(e.to_string())),
        }

        tracing::info!(
            "Started runner {} for brick '{}' (pid {:?})",
            self.id,
            self.brick_name,
            process.id()
        );
        *lock(&self.process) = Some(process);
        Ok(())
    }

    /// Claim the runner's control connection.
    ///
    /// Returns the outbox receiver the connection loop must drain, or `None`
    /// if the runner already has (or had) a connection.
    pub fn attach(&self) -> Option<mpsc::UnboundedReceiver<ControlMessage>> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.outbox) = Some(tx);
        self.advance(RunnerState::Registered);
        Some(rx)
    }

    /// Serve the runner's control connection until it closes or shutdown
    /// begins, then wait for the process to exit.
    pub async fn process_messages<T>(
        self: Arc<Self>,
        mut conn: Framed<T, ControlCodec>,
        mut outbox: mpsc::UnboundedReceiver<ControlMessage>,
    ) where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let token = self.ctx.tasks.token();
        tracing::debug!("Runner {} connected", self.id);

        // A stop requested before the runner connected still has to reach it
        if self.is_stop_requested() {
            if let Err(e) = conn.send(ControlMessage::Terminate).await {
                tracing::debug!("Runner {}: failed to send terminate: {}", self.id, e);
            }
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                Some(msg) = outbox.recv() => {
                    let kind = msg.kind();
                    if let Err(e) = conn.send(msg).await {
                        tracing::warn!("Runner {}: failed to send {}: {}", self.id, kind, e);
                        break;
                    }
                }
                frame = conn.next() => match frame {
                    Some(Ok(msg)) => {
                        if let Err(e) = self.handle_message(msg, &mut conn).await {
                            tracing::warn!("Runner {}: {}", self.id, e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Runner {}: control channel error: {}", self.id, e);
                        break;
                    }
                    None => break,
                },
            }
        }

        lock(&self.outbox).take();
        drop(conn);
        tracing::debug!("Runner {} disconnected", self.id);
        self.handle_disconnect().await;
    }

    async fn handle_message<S>(&self, msg: ControlMessage, conn: &mut S) -> Result<(), ProtocolError>
    where
        S: Sink<ControlMessage, Error = ProtocolError> + Unpin,
    {
        match msg {
            ControlMessage::AssignmentRequest { output_address } => {
                if self.output_address.set(output_address).is_err() {
                    tracing::warn!("Runner {} requested a second assignment, ignoring", self.id);
                    return Ok(());
                }
                self.send_assignment(conn).await
            }
            ControlMessage::SlowQueueAlert { target_name } => {
                match self.brick.upgrade() {
                    Some(brick) => brick.handle_slow_consumer(&target_name),
                    None => tracing::debug!(
                        "Runner {}: dropping slow queue alert, brick is gone",
                        self.id
                    ),
                }
                Ok(())
            }
            ControlMessage::Registration { .. } => {
                tracing::warn!("Runner {} registered twice, ignoring", self.id);
                Ok(())
            }
            other => {
                tracing::warn!(
                    "Runner {} sent unexpected {} message, ignoring",
                    self.id,
                    other.kind()
                );
                Ok(())
            }
        }
    }

    /// Send the runner its assignment, then mark it available.
    async fn send_assignment<S>(&self, conn: &mut S) -> Result<(), ProtocolError>
    where
        S: Sink<ControlMessage, Error = ProtocolError> + Unpin,
    {
        let Some(brick) = self.brick.upgrade() else {
            tracing::debug!("Runner {}: brick is gone, not assigning", self.id);
            return Ok(());
        };

        let content = brick.create_assignment();
        lock(&self.known_sources).extend(content.input_sources.iter().cloned());
        let sources = content.input_sources.len();

        conn.send(ControlMessage::Assignment(content)).await?;
        self.advance(RunnerState::Assigned);

        tracing::info!(
            "Runner {} of brick '{}' assigned with {} input sources, now available at {}",
            self.id,
            self.brick_name,
            sources,
            self.output_address().unwrap_or("?")
        );
        self.available.send_replace(true);
        self.advance(RunnerState::Available);
        Ok(())
    }

    /// Wait until the runner is available.
    ///
    /// Returns `false` if the runner terminated first or shutdown began.
    pub async fn wait_until_available(&self) -> bool {
        let token = self.ctx.tasks.token();
        let mut available = self.available.subscribe();
        let mut state = self.state.subscribe();

        tokio::select! {
            biased;
            res = available.wait_for(|a| *a) => res.is_ok(),
            _ = state.wait_for(|s| *s == RunnerState::Terminated) => false,
            _ = token.cancelled() => false,
        }
    }

    /// Tell the runner about sources it has not seen yet.
    ///
    /// Waits for availability first. Returns the number of sources sent.
    pub async fn update_input_sources(&self, new_sources: Vec<InputSource>) -> FlowResult<usize> {
        if !self.wait_until_available().await {
            return Ok(0);
        }

        let fresh = merge_new_sources(&mut lock(&self.known_sources), new_sources);
        if fresh.is_empty() {
            return Ok(0);
        }

        let count = fresh.len();
        tracing::debug!(
            "Runner {} of brick '{}' gets {} new input sources",
            self.id,
            self.brick_name,
            count
        );
        self.send(ControlMessage::InputSourceUpdate { new_sources: fresh })?;
        Ok(count)
    }

    fn send(&self, msg: ControlMessage) -> FlowResult<()> {
        match lock(&self.outbox).as_ref() {
            Some(tx) => tx.send(msg).map_err(|_| FlowError::NotConnected(self.id)),
            None => Err(FlowError::NotConnected(self.id)),
        }
    }

    /// Ask the runner to exit.
    ///
    /// Connected runners are sent `terminate`. A runner that never connected is
    /// killed; its launch watcher reaps it.
    pub fn stop(self: &Arc<Self>) -> StopOutcome {
        if self.stop_requested.swap(true, Ordering::SeqCst)
            || self.state() == RunnerState::Terminated
        {
            return StopOutcome::AlreadyStopping;
        }

        if self.send(ControlMessage::Terminate).is_ok() {
            tracing::debug!("Sent terminate to runner {}", self.id);
            return StopOutcome::TerminateSent;
        }

        tracing::debug!("Runner {} has no connection, killing it", self.id);
        self.kill();
        StopOutcome::Killed
    }

    /// Kill the subprocess without waiting
    pub fn kill(&self) {
        if let Some(process) = lock(&self.process).as_mut() {
            if let Err(e) = process.start_kill() {
                tracing::warn!("Failed to kill runner {}: {}", self.id, e);
            }
        }
    }

    /// Non-blocking exit check. A runner without a process counts as exited.
    pub fn poll_exit(&self) -> Option<ProcessExit> {
        let mut process = lock(&self.process);
        let Some(process) = process.as_mut() else {
            return Some(ProcessExit::signaled());
        };
        match process.try_wait() {
            Ok(exit) => exit,
            Err(e) => {
                tracing::warn!("Cannot query runner {} status: {}", self.id, e);
                Some(ProcessExit::signaled())
            }
        }
    }

    /// Watch a freshly launched runner until it connects back.
    ///
    /// A process that dies before registering is reaped here; once connected,
    /// exit handling belongs to [`BrickRunner::process_messages`].
    pub async fn watch_until_connected(&self) {
        if let Some(exit) = self.wait_for_exit(true).await {
            self.handle_exit(exit);
        }
    }

    /// Poll until the subprocess exits, then remove the runner from its brick.
    pub async fn handle_disconnect(&self) {
        if let Some(exit) = self.wait_for_exit(false).await {
            self.handle_exit(exit);
        }
    }

    /// Poll every `poll_interval` for the process to exit. Shutdown kills it.
    ///
    /// With `until_connected`, gives up with `None` once the runner has connected.
    async fn wait_for_exit(&self, until_connected: bool) -> Option<ProcessExit> {
        let token = self.ctx.tasks.token();
        let poll = self.ctx.poll_interval;
        let mut killed = false;

        loop {
            if let Some(exit) = self.poll_exit() {
                return Some(exit);
            }
            if until_connected && self.is_connected() {
                return None;
            }
            if killed {
                tokio::time::sleep(poll).await;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = token.cancelled() => {
                    self.kill();
                    killed = true;
                }
            }
        }
    }

    fn handle_exit(&self, exit: ProcessExit) {
        if self.exit_handled.swap(true, Ordering::SeqCst) {
            return;
        }

        if exit.success() {
            tracing::info!("Runner {} of brick '{}' exited", self.id, self.brick_name);
        } else {
            tracing::warn!(
                "Runner {} of brick '{}' exited with {}",
                self.id,
                self.brick_name,
                exit
            );
        }

        self.mark_terminated();
        match self.brick.upgrade() {
            Some(brick) => {
                brick.remove_runner(self.id);
            }
            None => {
                self.ctx.registry.remove(self.id);
            }
        }
    }

    pub fn snapshot(&self) -> RunnerSnapshot {
        RunnerSnapshot {
            id: self.id,
            state: self.state(),
            available: self.is_available(),
            output_address: self.output_address().map(str::to_string),
            known_sources: lock(&self.known_sources).len(),
            pid: lock(&self.process).as_ref().and_then(|p| p.id()),
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for BrickRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrickRunner")
            .field("id", &self.id)
            .field("brick", &self.brick_name)
            .field("state", &self.state())
            .field("output_address", &self.output_address())
            .finish()
    }
}

/// Insert `incoming` into `known`, returning only the sources that were new.
pub(crate) fn merge_new_sources(
    known: &mut HashSet<InputSource>,
    incoming: Vec<InputSource>,
) -> Vec<InputSource> {
    incoming
        .into_iter()
        .filter(|source| known.insert(source.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrickDefaults, FlowDefinition, Topology};
    use crate::flow::testing::{bring_up, connect, context, eventually, next_message};
    use crate::flow::{Flow, PortLink};
    use crate::process::mock::FakeLauncher;
    use crate::process::ProcessExit;
    use proptest::prelude::*;
    use std::time::Duration;

    fn single_brick_flow() -> FlowDefinition {
        let topology: Topology = toml::from_str(
            r#"
            [[flows]]
            name = "solo"
            [[flows.bricks]]
            name = "worker"
            module = "bricks.work"
            parameters = { level = 3 }
            "#,
        )
        .unwrap();
        topology.flows[0].clone()
    }

    fn source(addr: &str) -> InputSource {
        InputSource {
            brick: "upstream".to_string(),
            address: addr.to_string(),
            ports: vec![PortLink::new("default", "default")],
        }
    }

    #[tokio::test]
    async fn test_assignment_then_available() {
        let launcher = FakeLauncher::new();
        let ctx = context(launcher.clone());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx).unwrap();
        let brick = flow.brick("worker").unwrap();
        let runner = brick.start().unwrap();

        assert_eq!(runner.state(), RunnerState::Starting);
        assert_eq!(launcher.launched()[0].runner_id, runner.id());

        let (_conn, assignment) = bring_up(&runner, "10.0.0.1:9000").await;
        assert_eq!(assignment.brick, "worker");
        assert_eq!(assignment.module, "bricks.work");
        assert_eq!(assignment.parameters["level"], 3);
        assert!(runner.wait_until_available().await);
        assert_eq!(runner.state(), RunnerState::Available);
        assert_eq!(runner.output_address(), Some("10.0.0.1:9000"));
    }

    #[tokio::test]
    async fn test_second_attach_is_refused() {
        let ctx = context(FakeLauncher::new());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx).unwrap();
        let runner = flow.brick("worker").unwrap().start().unwrap();

        let _conn = connect(&runner);
        assert!(runner.attach().is_none());
        assert_eq!(runner.state(), RunnerState::Registered);
    }

    #[tokio::test]
    async fn test_update_sends_only_new_sources() {
        let ctx = context(FakeLauncher::new());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx).unwrap();
        let runner = flow.brick("worker").unwrap().start().unwrap();

        // Queued before the runner is available; must wait for the assignment
        let pending = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.update_input_sources(vec![source("a:1")]).await })
        };
        let (mut conn, assignment) = bring_up(&runner, "w:1").await;
        assert!(assignment.input_sources.is_empty());
        assert_eq!(pending.await.unwrap().unwrap(), 1);

        match next_message(&mut conn).await {
            ControlMessage::InputSourceUpdate { new_sources } => {
                assert_eq!(new_sources, vec![source("a:1")]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let sent = runner
            .update_input_sources(vec![source("a:1"), source("b:2"), source("b:2")])
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(runner.update_input_sources(vec![source("b:2")]).await.unwrap(), 0);
        assert_eq!(runner.known_sources().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_connected_runner_sends_terminate() {
        let launcher = FakeLauncher::new();
        let ctx = context(launcher.clone());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx.clone()).unwrap();
        let brick = flow.brick("worker").unwrap();
        let runner = brick.start().unwrap();
        let (mut conn, _) = bring_up(&runner, "w:1").await;

        assert_eq!(runner.stop(), StopOutcome::TerminateSent);
        assert_eq!(runner.stop(), StopOutcome::AlreadyStopping);
        assert_eq!(next_message(&mut conn).await, ControlMessage::Terminate);

        // The runner exits and closes its connection
        launcher.exit_handle(runner.id()).unwrap().exit(ProcessExit::code(0));
        drop(conn);

        assert!(eventually(|| brick.runner_count() == 0).await);
        assert!(!ctx.registry.contains(runner.id()));
        assert_eq!(runner.state(), RunnerState::Terminated);
    }

    #[tokio::test]
    async fn test_stop_unconnected_runner_kills_it() {
        let launcher = FakeLauncher::new();
        let ctx = context(launcher.clone());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx.clone()).unwrap();
        let brick = flow.brick("worker").unwrap();
        let runner = brick.start().unwrap();

        assert_eq!(runner.stop(), StopOutcome::Killed);
        assert!(launcher.exit_handle(runner.id()).unwrap().has_exited());
        assert!(eventually(|| !ctx.registry.contains(runner.id())).await);
        assert!(!runner.wait_until_available().await);
    }

    #[tokio::test]
    async fn test_crashed_runner_is_removed_within_poll_interval() {
        let launcher = FakeLauncher::new();
        let ctx = context(launcher.clone());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx.clone()).unwrap();
        let brick = flow.brick("worker").unwrap();
        let runner = brick.start().unwrap();
        let (conn, _) = bring_up(&runner, "w:1").await;

        // Connection drops while the process is still alive
        drop(conn);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(brick.runner_count(), 1);

        launcher.exit_handle(runner.id()).unwrap().exit(ProcessExit::code(137));
        tokio::time::sleep(ctx.poll_interval * 3).await;
        assert_eq!(brick.runner_count(), 0);
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_runner_dying_before_registration_is_reaped() {
        let launcher = FakeLauncher::new();
        let ctx = context(launcher.clone());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx.clone()).unwrap();
        let brick = flow.brick("worker").unwrap();
        let runner = brick.start().unwrap();

        // The module fails to load before the runner ever connects
        launcher.exit_handle(runner.id()).unwrap().exit(ProcessExit::code(1));
        tokio::time::sleep(ctx.poll_interval * 3).await;

        assert_eq!(brick.runner_count(), 0);
        assert!(ctx.registry.is_empty());
        assert_eq!(runner.state(), RunnerState::Terminated);
        assert!(!runner.wait_until_available().await);
    }

    #[tokio::test]
    async fn test_exit_status_at_spawn_decides_launch_failure() {
        let launcher = FakeLauncher::new();
        let ctx = context(launcher.clone());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx.clone()).unwrap();
        let brick = flow.brick("worker").unwrap();

        launcher.exit_on_launch(Some(ProcessExit::code(3)));
        let err = brick.start().unwrap_err();
        assert!(matches!(err, FlowError::Launch { .. }));
        assert_eq!(brick.runner_count(), 0);

        // A clean exit is a started runner that is reaped right away
        launcher.exit_on_launch(Some(ProcessExit::code(0)));
        let runner = brick.start().unwrap();
        assert!(eventually(|| brick.runner_count() == 0).await);
        assert_eq!(runner.state(), RunnerState::Terminated);
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_launch_leaves_no_trace() {
        let launcher = FakeLauncher::new();
        launcher.fail_launches(true);
        let ctx = context(launcher.clone());
        let flow = Flow::build(&single_brick_flow(), &BrickDefaults::default(), ctx.clone()).unwrap();
        let brick = flow.brick("worker").unwrap();

        let err = brick.start().unwrap_err();
        assert!(matches!(err, FlowError::Launch { .. }));
        assert_eq!(brick.runner_count(), 0);
        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn test_state_order() {
        assert!(RunnerState::Starting < RunnerState::Registered);
        assert!(RunnerState::Available < RunnerState::Terminated);
        assert_eq!(RunnerState::Assigned.to_string(), "assigned");
    }

    proptest! {
        #[test]
        fn merging_is_idempotent(addrs in prop::collection::vec("[a-d]:[1-3]", 0..20)) {
            let incoming: Vec<InputSource> = addrs.iter().map(|a| source(a)).collect();
            let mut known = HashSet::new();

            let first = merge_new_sources(&mut known, incoming.clone());
            let unique: HashSet<_> = incoming.iter().cloned().collect();
            prop_assert_eq!(first.len(), unique.len());
            prop_assert_eq!(&known, &unique);

            let second = merge_new_sources(&mut known, incoming);
            prop_assert!(second.is_empty());
        }
    }
}
