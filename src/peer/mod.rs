//! The control peer: owns all flows and the runner control channel.
//!
//! # Lifecycle
//!
//! ```text
//! setup()    bind listener, start accept loop, install signal handlers
//! run()      register with director → fetch topology → build + start flows → wait
//! shutdown() stop flows → close director → close listener → exit → join tasks
//! ```
//!
//! Runners connect to the control channel and identify themselves with a
//! `registration` message carrying the uid they were launched with. The
//! connection is then handed to the matching [`BrickRunner`](crate::flow::BrickRunner).

mod signals;

use crate::config::{ControlPeerConfig, FlowDefinition};
use crate::director::FlowDirector;
use crate::error::{BrickflowError, Result, ResultExt};
use crate::flow::{lock, Flow, FlowContext, FlowSnapshot, RunnerRegistry};
use crate::process::RunnerLauncher;
use crate::protocol::{framed, ControlMessage, ProtocolError};
use crate::tasks::TaskSupervisor;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

struct Listening {
    local_addr: SocketAddr,
    advertised: String,
    context: Arc<FlowContext>,
    token: CancellationToken,
}

pub struct ControlPeer {
    config: ControlPeerConfig,
    director: Arc<dyn FlowDirector>,
    launcher: Arc<dyn RunnerLauncher>,
    registry: RunnerRegistry,
    tasks: Arc<TaskSupervisor>,
    flows: Mutex<BTreeMap<String, Arc<Flow>>>,
    /// Serializes flow start/stop with each other and with shutdown
    flow_ops: tokio::sync::Mutex<()>,
    listening: OnceLock<Listening>,
    shutting_down: AtomicBool,
    exit: CancellationToken,
    shutdown: OnceCell<()>,
}

impl ControlPeer {
    pub fn new(
        config: ControlPeerConfig,
        director: Arc<dyn FlowDirector>,
        launcher: Arc<dyn RunnerLauncher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            director,
            launcher,
            registry: RunnerRegistry::new(),
            tasks: Arc::new(TaskSupervisor::new()),
            flows: Mutex::new(BTreeMap::new()),
            flow_ops: tokio::sync::Mutex::new(()),
            listening: OnceLock::new(),
            shutting_down: AtomicBool::new(false),
            exit: CancellationToken::new(),
            shutdown: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &ControlPeerConfig {
        &self.config
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    pub fn tasks(&self) -> &Arc<TaskSupervisor> {
        &self.tasks
    }

    /// Address the control listener is bound to, once set up
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.get().map(|l| l.local_addr)
    }

    /// Address announced to the director and to runners
    pub fn advertised_address(&self) -> Option<&str> {
        self.listening.get().map(|l| l.advertised.as_str())
    }

    /// Cancelled once shutdown has completed its main steps
    pub fn exit_token(&self) -> CancellationToken {
        self.exit.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn flows(&self) -> Vec<Arc<Flow>> {
        lock(&self.flows).values().cloned().collect()
    }

    pub fn flow(&self, name: &str) -> Option<Arc<Flow>> {
        lock(&self.flows).get(name).cloned()
    }

    pub fn snapshot(&self) -> Vec<FlowSnapshot> {
        self.flows().iter().map(|f| f.snapshot()).collect()
    }

    /// Bind the control channel and start accepting runner connections.
    ///
    /// Calling it again returns the existing address.
    pub async fn setup(self: &Arc<Self>) -> Result<SocketAddr> {
        if let Some(listening) = self.listening.get() {
            return Ok(listening.local_addr);
        }

        let control = &self.config.control;
        let listener = TcpListener::bind(control.bind_address())
            .await
            .with_context(|| format!("Failed to bind control channel {}", control.bind_address()))?;
        let local_addr = listener.local_addr()?;
        let advertised = control.advertised_address(local_addr);

        let context = Arc::new(FlowContext {
            registry: self.registry.clone(),
            launcher: self.launcher.clone(),
            tasks: self.tasks.clone(),
            control_address: advertised.clone(),
            bootstrap: self.config.data_plane.bootstrap.clone(),
            poll_interval: control.poll_interval(),
            stop_timeout: control.stop_timeout(),
        });
        let token = self.tasks.child_token();

        let listening = Listening {
            local_addr,
            advertised: advertised.clone(),
            context,
            token: token.clone(),
        };
        if self.listening.set(listening).is_err() {
            // Lost a race with a concurrent setup(); its listener wins
            return self.local_addr().ok_or(BrickflowError::NotSetUp);
        }

        let peer = Arc::downgrade(self);
        self.tasks
            .spawn("control-accept", accept_loop(peer, listener, token));

        if control.install_signal_handlers {
            signals::install(self).context("Failed to install signal handlers")?;
        }

        tracing::info!(
            "Control channel listening on {} (advertised as {})",
            local_addr,
            advertised
        );
        Ok(local_addr)
    }

    /// Register with the director, start every flow it knows and wait for shutdown.
    ///
    /// A rejected registration shuts the peer down and is returned as an error.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let advertised = self
            .advertised_address()
            .ok_or(BrickflowError::NotSetUp)?
            .to_string();

        match self.director.register(&advertised, &self.exit).await {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => {
                tracing::debug!("Registration abandoned: {}", e);
                self.exit.cancelled().await;
                return Ok(());
            }
            Err(e) => {
                tracing::error!("Registration with the flow director failed: {}", e);
                self.shutdown().await;
                return Err(e.into());
            }
        }

        let topology = self.director.get_flow_config().await;
        if topology.is_empty() {
            tracing::warn!("Flow director returned no flows");
        }

        {
            let _ops = self.flow_ops.lock().await;
            for def in &topology.flows {
                if self.is_shutting_down() {
                    break;
                }
                self.launch_flow(def);
            }
        }

        self.exit.cancelled().await;
        Ok(())
    }

    /// Build a flow from `def`, record it and start it. Callers hold `flow_ops`.
    fn launch_flow(&self, def: &FlowDefinition) -> Option<Arc<Flow>> {
        let context = self.listening.get()?.context.clone();
        match Flow::build(def, &self.config.brick_defaults, context) {
            Ok(flow) => {
                lock(&self.flows).insert(def.name.clone(), flow.clone());
                flow.start();
                Some(flow)
            }
            Err(e) => {
                tracing::error!("Skipping flow '{}': {}", def.name, e);
                None
            }
        }
    }

    /// Start `name`, fetching its current definition from the director.
    ///
    /// An already active flow is returned as is.
    pub async fn start_flow(&self, name: &str) -> Option<Arc<Flow>> {
        let _ops = self.flow_ops.lock().await;
        if self.is_shutting_down() {
            tracing::warn!("Not starting flow '{}': shutting down", name);
            return None;
        }
        if self.listening.get().is_none() {
            tracing::warn!("Not starting flow '{}': {}", name, BrickflowError::NotSetUp);
            return None;
        }

        if let Some(flow) = self.flow(name) {
            if flow.is_active() {
                return Some(flow);
            }
        }

        let topology = self.director.get_flow_config().await;
        let Some(def) = topology.find(name) else {
            tracing::warn!("Flow '{}' is not known to the director", name);
            return None;
        };
        self.launch_flow(def)
    }

    /// Stop `name`. Returns `None` for unknown flows.
    pub async fn stop_flow(&self, name: &str) -> Option<Arc<Flow>> {
        let _ops = self.flow_ops.lock().await;
        let Some(flow) = self.flow(name) else {
            tracing::warn!("Cannot stop unknown flow '{}'", name);
            return None;
        };
        flow.stop().await;
        Some(flow)
    }

    /// Identify a new control connection and hand it to its runner.
    ///
    /// Connections from unknown or already connected runners are dropped.
    pub async fn establish_communication<T>(&self, io: T) -> std::result::Result<(), ProtocolError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let timeout = self.config.control.registration_timeout();
        let mut conn = framed(io);

        let first = match tokio::time::timeout(timeout, conn.next()).await {
            Err(_) => return Err(ProtocolError::RegistrationTimeout(timeout)),
            Ok(None) => return Err(ProtocolError::ConnectionClosed),
            Ok(Some(frame)) => frame?,
        };
        let runner_uid = match first {
            ControlMessage::Registration { runner_uid } => runner_uid,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: "registration",
                    got: other.kind(),
                })
            }
        };

        let Some(runner) = self.registry.get(runner_uid) else {
            tracing::warn!("Dropping connection from unknown runner {}", runner_uid);
            return Ok(());
        };
        let Some(outbox) = runner.attach() else {
            tracing::warn!("Runner {} is already connected, dropping duplicate", runner_uid);
            return Ok(());
        };

        tracing::info!(
            "Runner {} of brick '{}' registered",
            runner_uid,
            runner.brick_name()
        );
        self.tasks
            .spawn("runner-connection", runner.process_messages(conn, outbox));
        Ok(())
    }

    /// Stop everything. Concurrent and repeated calls wait for the same shutdown.
    pub async fn shutdown(&self) {
        self.shutdown.get_or_init(|| self.shutdown_once()).await;
    }

    async fn shutdown_once(&self) {
        tracing::info!("Shutting down control peer");
        self.shutting_down.store(true, Ordering::SeqCst);

        {
            let _ops = self.flow_ops.lock().await;
            let flows = self.flows();
            futures::future::join_all(flows.iter().map(|f| f.stop())).await;
        }

        self.director.close().await;
        if let Some(listening) = self.listening.get() {
            listening.token.cancel();
        }
        self.exit.cancel();
        self.tasks
            .shutdown(self.config.control.stop_timeout())
            .await;

        tracing::info!("Control peer stopped");
    }
}

async fn accept_loop(peer: Weak<ControlPeer>, listener: TcpListener, token: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote)) => {
                let Some(peer) = peer.upgrade() else {
                    break;
                };
                tracing::debug!("Control connection from {}", remote);
                let handler = peer.clone();
                peer.tasks.spawn("control-connection", async move {
                    if let Err(e) = handler.establish_communication(stream).await {
                        tracing::warn!("Dropping control connection from {}: {}", remote, e);
                    }
                });
            }
            Err(e) => {
                tracing::warn!("Failed to accept control connection: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
    tracing::debug!("Control listener closed");
}
