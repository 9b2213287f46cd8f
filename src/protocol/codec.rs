//! Length-framed JSON codec for the control channel.
//!
//! Each frame is a 4-byte big-endian length followed by one JSON encoded
//! [`ControlMessage`]. Frames that are not valid messages are logged and
//! skipped; the connection stays up.

use super::ControlMessage;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed, LengthDelimitedCodec};

/// Largest accepted frame body
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Errors on the control channel.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Expected {expected} message, got {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },

    #[error("No registration received within {0:?}")]
    RegistrationTimeout(std::time::Duration),

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Codec turning a byte stream into [`ControlMessage`]s and back.
#[derive(Debug)]
pub struct ControlCodec {
    frames: LengthDelimitedCodec,
    skipped: u64,
}

impl ControlCodec {
    pub fn new() -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .big_endian()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
            skipped: 0,
        }
    }

    /// Number of malformed frames skipped so far
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ControlCodec {
    type Item = ControlMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ControlMessage>, ProtocolError> {
        while let Some(frame) = self.frames.decode(src)? {
            match serde_json::from_slice(&frame) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!("Dropping malformed control frame ({} bytes): {}", frame.len(), e);
                }
            }
        }
        Ok(None)
    }
}

impl Encoder<ControlMessage> for ControlCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let body = serde_json::to_vec(&item)?;
        self.frames.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}

/// Wrap a byte stream in the control codec
pub fn framed<T>(io: T) -> Framed<T, ControlCodec>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, ControlCodec::new())
}
