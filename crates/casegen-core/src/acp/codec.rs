//! Line framing for ACP byte streams.
//!
//! Wraps [`LinesCodec`] with a frame size limit. One frame is one UTF-8 line
//! terminated by `\n`; a trailing `\r` is stripped, blank lines are skipped.
//!
//! Decode errors are frame-local: an oversized line is discarded up to its
//! terminating newline and a line that is not UTF-8 is consumed whole, so the
//! caller can keep decoding from the same buffer.

use crate::error::{AcpError, Error, Result};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Default maximum frame length: 4 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug)]
pub struct FrameCodec {
    lines: LinesCodec,
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_bytes),
            max_frame_bytes,
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    fn map_error(&self, e: LinesCodecError) -> Error {
        match e {
            LinesCodecError::MaxLineLengthExceeded => Error::Acp(AcpError::Protocol(format!(
                "frame too long: exceeded {} bytes",
                self.max_frame_bytes
            ))),
            LinesCodecError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Error::Acp(AcpError::Protocol(format!("frame is not UTF-8: {}", e)))
            }
            LinesCodecError::Io(e) => Error::Io(e),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            match self.lines.decode(src) {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(other) => return Ok(other),
                Err(e) => return Err(self.map_error(e)),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(other) => return Ok(other),
                Err(e) => return Err(self.map_error(e)),
            }
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        if item.contains(['\n', '\r']) {
            return Err(Error::Acp(AcpError::Protocol(
                "outbound frame contains a line break".to_string(),
            )));
        }
        self.lines.encode(item, dst).map_err(|e| self.map_error(e))
    }
}
