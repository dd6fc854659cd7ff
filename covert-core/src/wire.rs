//! Framing for the steganographic byte stream: 4 bytes LE length + bincode.
//!
//! The video and audio carriers deliver a continuous run of bytes, a few
//! per frame, with no message boundaries of their own. Frames give the
//! receiving side back the chunk boundaries and the end-of-stream marker.

use serde::{Deserialize, Serialize};

const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 1024 * 1024; // 1 MiB

/// One frame of the embedded stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamFrame {
    /// One chunk of wire text.
    Chunk(String),
    /// No further chunks on this stream.
    End,
}

/// Encode a frame: 4 bytes LE length + bincode payload.
pub fn encode_frame(frame: &StreamFrame) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(frame).map_err(FrameEncodeError::Encode)?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the frame and the
/// number of bytes consumed; `NeedMore` until a whole frame is buffered.
pub fn decode_frame(bytes: &[u8]) -> Result<(StreamFrame, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let frame: StreamFrame =
        bincode::deserialize(&bytes[LEN_SIZE..LEN_SIZE + len]).map_err(FrameDecodeError::Decode)?;
    Ok((frame, LEN_SIZE + len))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

/// Accumulates the embedded byte stream as the host decodes it frame by
/// video/audio frame, and yields complete frames in order.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed freshly captured bytes; drain every complete frame. A corrupt
    /// frame aborts the drain and clears the buffer (the stream has no way
    /// to resynchronize past a bad length prefix).
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<StreamFrame>, FrameDecodeError> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        loop {
            match decode_frame(&self.buf) {
                Ok((frame, consumed)) => {
                    self.buf.drain(..consumed);
                    frames.push(frame);
                }
                Err(FrameDecodeError::NeedMore) => break,
                Err(e) => {
                    self.buf.clear();
                    return Err(e);
                }
            }
        }
        Ok(frames)
    }
}
