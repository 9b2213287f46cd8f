//! Flow-specific error types.

use crate::flow::id::RunnerId;
use thiserror::Error;

/// Errors raised while building flows or managing their runners.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Flow '{flow}' is misconfigured: {message}")]
    Config { flow: String, message: String },

    #[error("Failed to launch runner for brick '{brick}': {message}")]
    Launch { brick: String, message: String },

    #[error("Brick '{brick}' already runs its maximum of {max_instances} instances")]
    ScaleCapReached { brick: String, max_instances: usize },

    #[error("Brick '{0}' is stopping")]
    Stopping(String),

    #[error("Runner {0} is not connected")]
    NotConnected(RunnerId),

    #[error("Brick '{0}' is no longer part of a live flow")]
    BrickGone(String),
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;
