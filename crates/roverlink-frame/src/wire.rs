use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::compact::{decode_compact, CompactFrame, CompactKind};
use crate::error::Result;
use crate::extended::{decode_extended, ExtendedFrame, EXTENDED_HEADER_SIZE};

/// Which encoding a link speaks as its primary format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    /// Fixed-length compact frames only.
    #[default]
    Compact,
    /// Extended frames, with compact still accepted on receive.
    Extended,
}

impl ProtocolVersion {
    pub fn name(self) -> &'static str {
        match self {
            ProtocolVersion::Compact => "compact",
            ProtocolVersion::Extended => "extended",
        }
    }
}

/// One frame in either encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Compact(CompactFrame),
    Extended(ExtendedFrame),
}

impl Frame {
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Frame::Compact(frame) => frame.encode(dst),
            Frame::Extended(frame) => frame.encode(dst),
        }
    }

    pub fn wire_size(&self) -> usize {
        match self {
            Frame::Compact(frame) => frame.wire_size(),
            Frame::Extended(frame) => frame.wire_size(),
        }
    }
}

/// Decode one whole message whose boundaries the transport already knows.
///
/// With `Extended`, a datagram too short to hold an extended header that
/// starts with a compact kind byte is decoded as a compact frame, so compact
/// heartbeats and controller frames from an older peer still get through.
/// Any other short datagram is reported as a truncated extended frame.
pub fn decode_datagram(protocol: ProtocolVersion, datagram: &[u8]) -> Result<Frame> {
    match protocol {
        ProtocolVersion::Compact => decode_compact(datagram).map(Frame::Compact),
        ProtocolVersion::Extended if is_short_compact(datagram) => {
            decode_compact(datagram).map(Frame::Compact)
        }
        ProtocolVersion::Extended => decode_extended(datagram).map(Frame::Extended),
    }
}

fn is_short_compact(datagram: &[u8]) -> bool {
    datagram.len() < EXTENDED_HEADER_SIZE
        && datagram
            .first()
            .is_some_and(|&id| CompactKind::from_id(id).is_some())
}
