//! Error handling for the brickflow control plane
//!
//! This module defines the crate-level error type and a Result alias. Each
//! subsystem keeps its own narrower error enum (`FlowError`, `ProtocolError`,
//! `DirectorError`) which converts into [`BrickflowError`] at the boundary.

use crate::director::DirectorError;
use crate::flow::FlowError;
use crate::protocol::ProtocolError;
use thiserror::Error;

/// Main error type for brickflow operations
#[derive(Error, Debug)]
pub enum BrickflowError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while assembling or driving flows
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// Errors from the external flow director
    #[error("Director error: {0}")]
    Director(#[from] DirectorError),

    /// Errors on the runner control channel
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The control peer was used before `setup()` bound its listener
    #[error("Control peer has not been set up")]
    NotSetUp,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BrickflowError>,
    },
}

impl BrickflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BrickflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) is fatal for startup.
    pub fn is_fatal_startup(&self) -> bool {
        match self {
            BrickflowError::Director(e) => e.is_fatal(),
            BrickflowError::NotSetUp => true,
            BrickflowError::WithContext { source, .. } => source.is_fatal_startup(),
            _ => false,
        }
    }
}

/// Result type alias for brickflow operations
pub type Result<T> = std::result::Result<T, BrickflowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BrickflowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
