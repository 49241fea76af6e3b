//! Wire protocol codec for Unix domain socket IPC.
//!
//! Length-prefixed frames with a type byte:
//!
//! ```text
//! [u32 LE length] [u8 type] [payload: length-1 bytes]
//! ```
//!
//! Frame types:
//! - `0x01`: JSON message (UTF-8 `serde_json::Value`)
//!
//! The on-wire format keeps the type byte (and room for `MAX_FRAME_SIZE`
//! headroom) even though JSON is the only frame the Fan-out ever emits
//! (§6): every frame in the protocol — `snapshot`, `output`, `input`,
//! `resize`, `claude:event`, `closed`, `shutdown` — is a JSON object
//! distinguished by its own `"type"` field, not by the wire frame type.

use anyhow::{anyhow, bail, Result};

/// Maximum frame payload size (16 MB).
const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Frame type constants.
pub mod frame_type {
    /// JSON control message.
    pub const JSON: u8 = 0x01;
}

/// A decoded frame from the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// JSON control message.
    Json(serde_json::Value),
}

impl Frame {
    /// Encode this frame into a wire-format byte vector.
    ///
    /// Returns `[u32 LE length][u8 type][payload]`.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Json(value) => {
                let payload = serde_json::to_vec(value).expect("JSON serialization cannot fail");
                encode_raw(frame_type::JSON, &payload)
            }
        }
    }
}

/// Encode a raw frame with type byte and payload.
fn encode_raw(frame_type: u8, payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() + 1) as u32; // +1 for type byte
    let mut buf = Vec::with_capacity(4 + 1 + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.push(frame_type);
    buf.extend_from_slice(payload);
    buf
}

/// Decode a single frame from a type byte and payload.
fn decode_frame(frame_type: u8, payload: &[u8]) -> Result<Frame> {
    match frame_type {
        frame_type::JSON => {
            let value: serde_json::Value =
                serde_json::from_slice(payload).map_err(|e| anyhow!("Invalid JSON frame: {e}"))?;
            Ok(Frame::Json(value))
        }
        _ => bail!("Unknown frame type: 0x{frame_type:02x}"),
    }
}

/// Incremental frame decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and extract complete frames.
/// Handles TCP-style byte stream reassembly.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a new decoder with empty buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed bytes into the decoder and extract all complete frames.
    ///
    /// Returns decoded frames. Incomplete data is buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame is malformed or exceeds the size limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            // Need at least 4 bytes for the length header
            if self.buf.len() < 4 {
                break;
            }

            let length = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);

            if length == 0 {
                bail!("Invalid frame: zero length");
            }
            if length > MAX_FRAME_SIZE {
                bail!("Frame too large: {length} bytes (max {MAX_FRAME_SIZE})");
            }

            let total = 4 + length as usize;
            if self.buf.len() < total {
                break; // Incomplete frame, wait for more data
            }

            // Extract the complete frame
            let frame_type = self.buf[4];
            let payload = &self.buf[5..total];
            let frame = decode_frame(frame_type, payload)?;
            frames.push(frame);

            // Remove consumed bytes
            self.buf.drain(..total);
        }

        Ok(frames)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
