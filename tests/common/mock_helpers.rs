//! Mock construction helpers
//!
//! - [`SimulatedLauncher`]: runners as in-process tasks speaking the real
//!   control protocol over TCP
//! - [`StubDirector`]: a scripted HTTP flow director

use brickflow::flow::RunnerId;
use brickflow::process::{LaunchRequest, ProcessExit, RunnerLauncher, RunnerProcess};
use brickflow::protocol::{framed, AssignmentContent, ControlMessage, InputSource};
use futures::{SinkExt, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

// ==================== Simulated runners ====================

struct SimState {
    runner_id: RunnerId,
    brick: String,
    address: String,
    received: Mutex<Vec<ControlMessage>>,
    exit: Mutex<Option<ProcessExit>>,
    outgoing: mpsc::UnboundedSender<ControlMessage>,
    kill: CancellationToken,
}

impl SimState {
    fn set_exit(&self, exit: ProcessExit) {
        let mut slot = self.exit.lock().unwrap();
        if slot.is_none() {
            *slot = Some(exit);
        }
    }
}

/// Test-side handle to one simulated runner
#[derive(Clone)]
pub struct SimRunner {
    state: Arc<SimState>,
}

impl SimRunner {
    pub fn id(&self) -> RunnerId {
        self.state.runner_id
    }

    pub fn brick(&self) -> &str {
        &self.state.brick
    }

    /// Output address announced in the assignment request
    pub fn address(&self) -> &str {
        &self.state.address
    }

    pub fn messages(&self) -> Vec<ControlMessage> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn assignment(&self) -> Option<AssignmentContent> {
        self.messages().into_iter().find_map(|m| match m {
            ControlMessage::Assignment(content) => Some(content),
            _ => None,
        })
    }

    /// Sources delivered through `input_source_update` messages
    pub fn updates(&self) -> Vec<InputSource> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                ControlMessage::InputSourceUpdate { new_sources } => Some(new_sources),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Addresses of every input source the runner has learned about
    pub fn known_addresses(&self) -> HashSet<String> {
        let from_assignment = self
            .assignment()
            .map(|a| a.input_sources)
            .unwrap_or_default();
        from_assignment
            .into_iter()
            .chain(self.updates())
            .map(|s| s.address)
            .collect()
    }

    pub fn terminate_count(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| matches!(m, ControlMessage::Terminate))
            .count()
    }

    pub fn has_exited(&self) -> bool {
        self.state.exit.lock().unwrap().is_some()
    }

    /// Send a frame to the control peer
    pub fn send(&self, msg: ControlMessage) {
        let _ = self.state.outgoing.send(msg);
    }

    pub fn report_slow_consumer(&self, target: &str) {
        self.send(ControlMessage::SlowQueueAlert {
            target_name: target.to_string(),
        });
    }

    /// Die abruptly with a non-zero exit code
    pub fn crash(&self) {
        self.state.set_exit(ProcessExit::code(137));
        self.state.kill.cancel();
    }
}

#[derive(Debug)]
struct SimProcess {
    state: Arc<SimState>,
}

impl std::fmt::Debug for SimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimState")
            .field("runner_id", &self.runner_id)
            .field("brick", &self.brick)
            .finish()
    }
}

impl RunnerProcess for SimProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(*self.state.exit.lock().unwrap())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.state.set_exit(ProcessExit::signaled());
        self.state.kill.cancel();
        Ok(())
    }
}

/// Launches simulated runners that connect back over TCP
pub struct SimulatedLauncher {
    runners: Mutex<Vec<SimRunner>>,
    gate: watch::Sender<bool>,
    fail: Mutex<bool>,
    die_before_registering: Mutex<bool>,
}

impl SimulatedLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runners: Mutex::new(Vec::new()),
            gate: watch::Sender::new(true),
            fail: Mutex::new(false),
            die_before_registering: Mutex::new(false),
        })
    }

    /// Make every launch fail
    pub fn fail_launches(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Runners launched from now on exit with code 1 before connecting back
    pub fn die_before_registering(&self, die: bool) {
        *self.die_before_registering.lock().unwrap() = die;
    }

    /// Runners launched from now on register but hold back their assignment request
    pub fn hold_assignments(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_assignments(&self) {
        self.gate.send_replace(true);
    }

    pub fn runners(&self) -> Vec<SimRunner> {
        self.runners.lock().unwrap().clone()
    }

    pub fn runners_for(&self, brick: &str) -> Vec<SimRunner> {
        self.runners()
            .into_iter()
            .filter(|r| r.brick() == brick)
            .collect()
    }

    pub fn runner(&self, id: RunnerId) -> Option<SimRunner> {
        self.runners().into_iter().find(|r| r.id() == id)
    }
}

impl RunnerLauncher for SimulatedLauncher {
    fn launch(&self, request: &LaunchRequest) -> io::Result<Box<dyn RunnerProcess>> {
        if *self.fail.lock().unwrap() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "brick-runner not found"));
        }

        let mut runners = self.runners.lock().unwrap();
        let ordinal = runners.iter().filter(|r| r.brick() == request.brick).count() + 1;
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let state = Arc::new(SimState {
            runner_id: request.runner_id,
            brick: request.brick.clone(),
            address: format!("sim://{}/{}", request.brick, ordinal),
            received: Mutex::new(Vec::new()),
            exit: Mutex::new(None),
            outgoing,
            kill: CancellationToken::new(),
        });
        runners.push(SimRunner {
            state: state.clone(),
        });

        if *self.die_before_registering.lock().unwrap() {
            let dying = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                dying.set_exit(ProcessExit::code(1));
            });
            return Ok(Box::new(SimProcess { state }));
        }

        tokio::spawn(drive_runner(
            state.clone(),
            request.control_address.clone(),
            self.gate.subscribe(),
            outgoing_rx,
        ));
        Ok(Box::new(SimProcess { state }))
    }
}

async fn drive_runner(
    state: Arc<SimState>,
    control_address: String,
    mut gate: watch::Receiver<bool>,
    mut outgoing: mpsc::UnboundedReceiver<ControlMessage>,
) {
    let Ok(stream) = TcpStream::connect(&control_address).await else {
        state.set_exit(ProcessExit::code(2));
        return;
    };
    let mut conn = framed(stream);

    let registration = ControlMessage::Registration {
        runner_uid: state.runner_id,
    };
    if conn.send(registration).await.is_err() {
        state.set_exit(ProcessExit::code(2));
        return;
    }

    tokio::select! {
        _ = state.kill.cancelled() => return,
        _ = gate.wait_for(|open| *open) => {}
    }

    let request = ControlMessage::AssignmentRequest {
        output_address: state.address.clone(),
    };
    if conn.send(request).await.is_err() {
        state.set_exit(ProcessExit::code(2));
        return;
    }

    loop {
        tokio::select! {
            _ = state.kill.cancelled() => return,
            Some(msg) = outgoing.recv() => {
                if conn.send(msg).await.is_err() {
                    break;
                }
            }
            frame = conn.next() => match frame {
                Some(Ok(msg)) => {
                    let terminate = matches!(msg, ControlMessage::Terminate);
                    state.received.lock().unwrap().push(msg);
                    if terminate {
                        break;
                    }
                }
                _ => break,
            },
        }
    }
    state.set_exit(ProcessExit::code(0));
}

// ==================== Stub HTTP director ====================

/// One request the stub director received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// HTTP server answering with scripted responses, in order.
///
/// Once the script runs out, the last response repeats.
pub struct StubDirector {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: CancellationToken,
}

impl StubDirector {
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let script = Arc::new(Mutex::new(VecDeque::from(responses)));
        let recorded = requests.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => continue,
                    },
                };
                let response = {
                    let mut script = script.lock().unwrap();
                    if script.len() > 1 {
                        script.pop_front()
                    } else {
                        script.front().cloned()
                    }
                };
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve_one(stream, response, recorded).await;
                });
            }
        });

        Self {
            url,
            requests,
            shutdown,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

impl Drop for StubDirector {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve_one(
    mut stream: TcpStream,
    response: Option<(u16, String)>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    recorded.lock().unwrap().push(RecordedRequest { method, path, body });

    let (status, body) = response.unwrap_or((500, String::new()));
    let reply = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await
}
