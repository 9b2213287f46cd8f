//! Flow director clients.
//!
//! The flow director is the external service that knows which flows exist.
//! A control peer registers its control address with it and then fetches the
//! topology of the flows it should run.
//!
//! Two implementations exist:
//! - [`HttpFlowDirector`] talks to a director service over HTTP
//! - [`StaticFlowDirector`] serves a topology loaded from a local file

mod http;

pub use http::HttpFlowDirector;

use crate::config::{DirectorConfig, Topology};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from the flow director
#[derive(Error, Debug)]
pub enum DirectorError {
    #[error("Registration rejected: {0}")]
    Registration(String),

    #[error("Address {0} is already registered by another control peer")]
    AddressConflict(String),

    #[error("Registration cancelled by shutdown")]
    Cancelled,

    #[error("Director client is closed")]
    Closed,

    #[error("Invalid director URL '{0}'")]
    InvalidUrl(String),

    #[error("Failed to load topology: {0}")]
    Topology(String),

    #[error("No director URL or topology file configured")]
    NotConfigured,
}

impl DirectorError {
    /// Whether the control peer cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DirectorError::Cancelled | DirectorError::Closed)
    }
}

/// Source of flow topology
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlowDirector: Send + Sync {
    /// Announce the control peer at `address`.
    ///
    /// Transient failures are retried until `cancel` fires.
    async fn register(&self, address: &str, cancel: &CancellationToken)
        -> Result<(), DirectorError>;

    /// Current topology. Failures yield an empty topology.
    async fn get_flow_config(&self) -> Topology;

    /// Release client resources
    async fn close(&self);
}

/// Director backed by a fixed topology
#[derive(Debug, Clone, Default)]
pub struct StaticFlowDirector {
    topology: Topology,
}

impl StaticFlowDirector {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    /// Load the topology from a TOML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DirectorError> {
        let topology =
            Topology::load(path).map_err(|e| DirectorError::Topology(e.to_string()))?;
        for flow in &topology.flows {
            flow.validate()
                .map_err(|e| DirectorError::Topology(e.to_string()))?;
        }
        Ok(Self::new(topology))
    }
}

#[async_trait]
impl FlowDirector for StaticFlowDirector {
    async fn register(
        &self,
        address: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), DirectorError> {
        tracing::info!("Control peer at {} uses a static topology", address);
        Ok(())
    }

    async fn get_flow_config(&self) -> Topology {
        self.topology.clone()
    }

    async fn close(&self) {}
}

/// Build the director described by the configuration.
///
/// A URL takes precedence over a topology file.
pub fn from_config(config: &DirectorConfig) -> Result<Arc<dyn FlowDirector>, DirectorError> {
    if let Some(url) = &config.url {
        let director = HttpFlowDirector::new(url, config.request_timeout(), config.retry_delay())?;
        return Ok(Arc::new(director));
    }
    if let Some(path) = &config.topology_file {
        return Ok(Arc::new(StaticFlowDirector::from_file(path)?));
    }
    Err(DirectorError::NotConfigured)
}
