//! Configuration module for the brickflow control peer
//!
//! This module handles:
//! - The control peer configuration file (`control-peer.toml`)
//! - Defaults applied to bricks that do not override them
//! - The topology document format served by the flow director (see [`topology`])
//!
//! # Config Location
//!
//! When no path is given on the command line the configuration is read from the
//! platform-appropriate config directory:
//! - **Linux**: `~/.config/brickflow/control-peer.toml`
//! - **macOS**: `~/Library/Application Support/brickflow/control-peer.toml`
//! - **Windows**: `%APPDATA%\brickflow\control-peer.toml`
//!
//! # Example
//!
//! ```toml
//! [control]
//! host = "0.0.0.0"
//! port = 7100
//! advertise_host = "10.0.0.12"
//!
//! [director]
//! url = "http://director.internal:8080"
//!
//! [runner]
//! program = "/usr/local/bin/brick-runner"
//!
//! [data_plane]
//! bootstrap = ["--bus", "nats://bus.internal:4222"]
//!
//! [brick_defaults]
//! max_instances = 4
//! ```

pub mod topology;

pub use topology::{
    BrickDefinition, BrickSettings, ConnectionDefinition, FlowDefinition, Topology,
};

use crate::error::{BrickflowError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "brickflow";

/// Config filename inside the config directory
pub const CONFIG_FILE: &str = "control-peer.toml";

/// Default interface the control channel binds to
pub const DEFAULT_CONTROL_HOST: &str = "127.0.0.1";

/// Default interval between subprocess exit polls in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default time a brick waits for its runners to exit on stop
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 10_000;

/// Default time a new connection has to send its registration
pub const DEFAULT_REGISTRATION_TIMEOUT_MS: u64 = 10_000;

/// Default delay between director retries
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Default timeout for a single director HTTP request
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default runner executable
pub const DEFAULT_RUNNER_PROGRAM: &str = "brick-runner";

/// Default cap on concurrently running instances of one brick
pub const DEFAULT_MAX_INSTANCES: usize = 4;

/// Default queue length at which a producer reports a slow consumer
pub const DEFAULT_SCALE_THRESHOLD: u32 = 1_000;

/// Default time an idle runner waits before exiting
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default log directives when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,brickflow=debug";

// ==================== Config Directory ====================

/// Get the brickflow config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default control peer config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Control Peer Config ====================

/// Complete configuration of a control peer process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlPeerConfig {
    /// TCP control channel and runner supervision settings
    #[serde(default)]
    pub control: ControlChannelConfig,

    /// Where topology comes from
    #[serde(default)]
    pub director: DirectorConfig,

    /// How runner subprocesses are launched
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Opaque data-plane bootstrap handed to every runner
    #[serde(default)]
    pub data_plane: DataPlaneConfig,

    /// Values for bricks that do not set their own
    #[serde(default)]
    pub brick_defaults: BrickDefaults,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ControlPeerConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BrickflowError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            BrickflowError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config at `path`, or the default location, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => path,
            None => return Self::default(),
        };

        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BrickflowError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| BrickflowError::Serialization(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| {
            BrickflowError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject values the control peer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.runner.program.as_os_str().is_empty() {
            return Err(BrickflowError::Config(
                "runner.program must not be empty".to_string(),
            ));
        }
        if self.brick_defaults.max_instances == 0 {
            return Err(BrickflowError::Config(
                "brick_defaults.max_instances must be at least 1".to_string(),
            ));
        }
        if self.control.poll_interval_ms == 0 {
            return Err(BrickflowError::Config(
                "control.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(url) = &self.director.url {
            if url.trim().is_empty() {
                return Err(BrickflowError::Config(
                    "director.url must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ==================== Control Channel ====================

/// Settings for the TCP control channel and runner supervision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlChannelConfig {
    /// Interface to bind
    #[serde(default = "default_control_host")]
    pub host: String,

    /// Port to bind (0 picks an ephemeral port)
    #[serde(default)]
    pub port: u16,

    /// Host advertised to the director and to runners, when it differs from `host`
    #[serde(default)]
    pub advertise_host: Option<String>,

    /// Interval between subprocess exit polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a stopping brick waits for its runners before killing them
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// How long a new connection has to register
    #[serde(default = "default_registration_timeout_ms")]
    pub registration_timeout_ms: u64,

    /// Install SIGINT/SIGTERM handlers during setup
    #[serde(default = "default_true")]
    pub install_signal_handlers: bool,
}

fn default_control_host() -> String {
    DEFAULT_CONTROL_HOST.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_stop_timeout_ms() -> u64 {
    DEFAULT_STOP_TIMEOUT_MS
}

fn default_registration_timeout_ms() -> u64 {
    DEFAULT_REGISTRATION_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl Default for ControlChannelConfig {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: 0,
            advertise_host: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            registration_timeout_ms: DEFAULT_REGISTRATION_TIMEOUT_MS,
            install_signal_handlers: true,
        }
    }
}

impl ControlChannelConfig {
    /// Address string passed to `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `host:port` other processes should use to reach the listener bound at `local`
    pub fn advertised_address(&self, local: SocketAddr) -> String {
        match &self.advertise_host {
            Some(host) => format!("{}:{}", host, local.port()),
            None => local.to_string(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }
}

// ==================== Director ====================

/// Where the control peer registers and gets its topology from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorConfig {
    /// Base URL of the flow director service
    #[serde(default)]
    pub url: Option<String>,

    /// Local topology file used when no director URL is configured
    #[serde(default)]
    pub topology_file: Option<PathBuf>,

    /// Delay between registration retries
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Timeout of a single HTTP request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            topology_file: None,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl DirectorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ==================== Runner / Data Plane ====================

/// How runner subprocesses are launched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Runner executable
    #[serde(default = "default_runner_program")]
    pub program: PathBuf,

    /// Arguments placed before the control arguments
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_runner_program() -> PathBuf {
    PathBuf::from(DEFAULT_RUNNER_PROGRAM)
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: default_runner_program(),
            args: Vec::new(),
        }
    }
}

/// Data-plane bootstrap arguments. The control peer never interprets these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPlaneConfig {
    #[serde(default)]
    pub bootstrap: Vec<String>,
}

// ==================== Brick Defaults ====================

/// Settings applied to bricks whose definition leaves them out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickDefaults {
    /// Maximum concurrently running instances
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,

    /// Queue length at which a producer reports this brick as slow
    #[serde(default = "default_scale_threshold")]
    pub scale_threshold: u32,

    /// Seconds an idle runner waits before exiting
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_instances() -> usize {
    DEFAULT_MAX_INSTANCES
}

fn default_scale_threshold() -> u32 {
    DEFAULT_SCALE_THRESHOLD
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

impl Default for BrickDefaults {
    fn default() -> Self {
        Self {
            max_instances: DEFAULT_MAX_INSTANCES,
            scale_threshold: DEFAULT_SCALE_THRESHOLD,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

// ==================== Logging ====================

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for daily-rolling log files; stderr only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            directory: None,
        }
    }
}
