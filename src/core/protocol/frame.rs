// src/core/protocol/frame.rs

//! Implements the frame structure exchanged between nexus and minion and the
//! corresponding `Encoder` and `Decoder` for network communication.
//!
//! Framing is a 4-byte big-endian payload length followed by the JSON
//! encoding of a [`Frame`]. A connection carries either registration
//! round-trips (`Register`/`RegisterAck`) or, once a `StreamHello` has been
//! seen, the multiplexed command stream (`Command` one way, `Status` and
//! `Result` the other).

use crate::core::HiveLinkError;
use crate::core::commands::{CommandResult, CommandSpec, CommandStatusUpdate};
use crate::core::host::HostInfo;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix preceding every frame.
const LENGTH_PREFIX: usize = 4;

// Protocol-level limit to prevent denial-of-service from malicious or
// malformed frames announcing absurd lengths.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// A single message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client → server: announce (or refresh) host info. Repeated sends on
    /// one connection serve as heartbeats.
    Register { info: HostInfo },
    /// Server → client: the outcome of a `Register`.
    RegisterAck {
        success: bool,
        assigned_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Client → server: first frame of a command stream, carrying the
    /// caller's identity.
    StreamHello { minion_id: String },
    /// Server → client: the stream is serviceable; commands may follow.
    StreamReady,
    /// Server → client: a unit of work.
    Command { spec: CommandSpec },
    /// Client → server: a progress report.
    Status { update: CommandStatusUpdate },
    /// Client → server: a terminal result.
    Result { result: CommandResult },
    /// Server → client: the reason a connection is being refused.
    Error { message: String },
}

impl Frame {
    /// A convenience method to encode a frame into a `Vec<u8>`. Useful in
    /// tests and anywhere a complete byte vector is needed.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, HiveLinkError> {
        let mut buf = BytesMut::new();
        FrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding [`Frame`]s.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = HiveLinkError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(HiveLinkError::Protocol(format!(
                "frame of {} bytes exceeds the {} byte limit",
                payload.len(),
                MAX_FRAME_SIZE
            )));
        }
        dst.reserve(LENGTH_PREFIX + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = HiveLinkError;

    /// Decodes a [`Frame`] from a `BytesMut` buffer.
    ///
    /// It returns `Ok(None)` if the buffer does not contain a full frame yet,
    /// allowing the `Framed` stream to wait for more data from the network.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut length_bytes = [0u8; LENGTH_PREFIX];
        length_bytes.copy_from_slice(&src[..LENGTH_PREFIX]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > MAX_FRAME_SIZE {
            return Err(HiveLinkError::Protocol(format!(
                "frame of {length} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
            )));
        }

        if src.len() < LENGTH_PREFIX + length {
            // Reserve for the rest of the frame and wait for more data.
            src.reserve(LENGTH_PREFIX + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let payload = src.split_to(length);
        let frame = serde_json::from_slice(&payload)?;
        Ok(Some(frame))
    }
}
