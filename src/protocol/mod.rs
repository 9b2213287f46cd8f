//! Runner control protocol.
//!
//! Runners and the control peer exchange length-framed JSON objects over TCP.
//! Every object carries a `"type"` tag naming the message:
//!
//! ```text
//! runner → peer   registration        { runner_uid }
//!                 assignment_request  { output_address }
//!                 slow_queue_alert    { target_name }
//! peer → runner   assignment          { brick, module, parameters, idle_timeout_secs,
//!                                       input_sources, output_targets }
//!                 input_source_update { new_sources }
//!                 terminate
//! ```
//!
//! Framing and serialization live in [`codec`].

pub mod codec;

pub use codec::{framed, ControlCodec, ProtocolError, MAX_FRAME_LENGTH};

use crate::flow::{PortLink, RunnerId};
use serde::{Deserialize, Serialize};

/// An upstream runner a consumer should read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSource {
    /// Name of the producing brick
    pub brick: String,
    /// Output address the producing runner announced
    pub address: String,
    /// Port pairs linking the producer to the consumer
    pub ports: Vec<PortLink>,
}

/// A downstream brick a producer writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub brick: String,
    pub ports: Vec<PortLink>,
    /// Queue length at which the producer should send a `slow_queue_alert`
    pub scale_threshold: u32,
}

/// Everything a runner needs to start processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentContent {
    pub brick: String,
    pub module: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub input_sources: Vec<InputSource>,
    #[serde(default)]
    pub output_targets: Vec<OutputTarget>,
}

/// One control channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Registration { runner_uid: RunnerId },
    AssignmentRequest { output_address: String },
    SlowQueueAlert { target_name: String },
    Assignment(AssignmentContent),
    InputSourceUpdate { new_sources: Vec<InputSource> },
    Terminate,
}

impl ControlMessage {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Registration { .. } => "registration",
            ControlMessage::AssignmentRequest { .. } => "assignment_request",
            ControlMessage::SlowQueueAlert { .. } => "slow_queue_alert",
            ControlMessage::Assignment(_) => "assignment",
            ControlMessage::InputSourceUpdate { .. } => "input_source_update",
            ControlMessage::Terminate => "terminate",
        }
    }
}
