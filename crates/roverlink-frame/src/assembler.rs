use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::compact::{compact_len, decode_compact};
use crate::error::{FrameError, Result};
use crate::extended::split_extended;
use crate::wire::{Frame, ProtocolVersion};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Reassembles whole frames from a byte stream such as a serial radio.
///
/// Bytes go in with `push` in whatever chunks the transport delivered;
/// `next_frame` hands back complete frames. Extended frames are delimited by
/// their LENGTH field, compact frames by the fixed length of their kind.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    protocol: ProtocolVersion,
}

impl FrameAssembler {
    pub fn new(protocol: ProtocolVersion) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            protocol,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete frame, if one is buffered.
    ///
    /// A compact stream that starts with an unknown kind byte loses that one
    /// byte and reports `UnknownKind`; calling again continues from the next
    /// byte, so the stream resynchronises on the next valid kind.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.protocol {
            ProtocolVersion::Extended => Ok(split_extended(&mut self.buf).map(Frame::Extended)),
            ProtocolVersion::Compact => self.next_compact(),
        }
    }

    fn next_compact(&mut self) -> Result<Option<Frame>> {
        let Some(&id) = self.buf.first() else {
            return Ok(None);
        };

        let len = match compact_len(id) {
            Ok(len) => len,
            Err(err) => {
                self.buf.advance(1);
                debug!(kind = id, "dropped unknown leading byte");
                return Err(err);
            }
        };
        if self.buf.len() < len {
            return Ok(None);
        }

        let bytes = self.buf.split_to(len);
        decode_compact(&bytes).map(|frame| Some(Frame::Compact(frame)))
    }

    /// Bytes buffered but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Discard any partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Drain every complete frame, collecting per-frame errors alongside.
pub fn drain_frames(assembler: &mut FrameAssembler) -> Vec<std::result::Result<Frame, FrameError>> {
    let mut out = Vec::new();
    loop {
        match assembler.next_frame() {
            Ok(Some(frame)) => out.push(Ok(frame)),
            Ok(None) => return out,
            Err(err) => out.push(Err(err)),
        }
    }
}
