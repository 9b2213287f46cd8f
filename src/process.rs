//! Runner subprocess launching.
//!
//! Bricks never touch `tokio::process` directly. They go through the
//! [`RunnerLauncher`] / [`RunnerProcess`] seam so tests can substitute
//! in-process runners for real executables.

use crate::config::RunnerConfig;
use crate::flow::RunnerId;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

/// How a runner process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Everything needed to start one runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub runner_id: RunnerId,
    /// Brick the runner will serve, for logging only
    pub brick: String,
    /// `host:port` of the control channel
    pub control_address: String,
    /// Opaque data-plane bootstrap arguments
    pub bootstrap: Vec<String>,
}

impl LaunchRequest {
    /// Arguments appended after the configured runner arguments:
    /// `--uid <uid> --control <host:port> <bootstrap...>`
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(4 + self.bootstrap.len());
        args.push("--uid".to_string());
        args.push(self.runner_id.to_string());
        args.push("--control".to_string());
        args.push(self.control_address.clone());
        args.extend(self.bootstrap.iter().cloned());
        args
    }
}

/// Handle to a live runner process
pub trait RunnerProcess: Send + Sync + fmt::Debug {
    /// OS process id, if there is one
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Ask the OS to kill the process without waiting for it
    fn start_kill(&mut self) -> io::Result<()>;
}

/// Creates runner processes
pub trait RunnerLauncher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> io::Result<Box<dyn RunnerProcess>>;
}

/// Launches runners as OS subprocesses
#[derive(Debug, Clone)]
pub struct SubprocessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl SubprocessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

impl RunnerLauncher for SubprocessLauncher {
    fn launch(&self, request: &LaunchRequest) -> io::Result<Box<dyn RunnerProcess>> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .args(request.cli_args())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        tracing::debug!(
            "Spawned {:?} for brick '{}' (runner {}, pid {:?})",
            self.program,
            request.brick,
            request.runner_id,
            child.id()
        );
        Ok(Box::new(Subprocess { child }))
    }
}

#[derive(Debug)]
struct Subprocess {
    child: tokio::process::Child,
}

impl RunnerProcess for Subprocess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }

    fn start_kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            // Already reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}
