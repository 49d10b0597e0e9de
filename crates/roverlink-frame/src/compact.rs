use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Longest compact frame on the wire (the controller frame).
pub const MAX_COMPACT_LEN: usize = 10;

/// Compact frame kinds. The discriminant is the first byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CompactKind {
    /// Full controller state, 10 bytes.
    Controller = 0xDE,
    /// Liveness beacon carrying the low 16 bits of unix seconds, 3 bytes.
    Heartbeat = 0xAA,
    /// Rover status flags and battery voltage, 6 bytes.
    Status = 0xA5,
    /// Shutdown notice, 1 byte.
    Quit = 0xFE,
}

/// The width and interpretation of one slot in a compact layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    /// Big-endian high byte then low byte.
    U16,
    /// Big-endian IEEE-754 single precision.
    F32,
    /// Eight booleans in one byte, index 0 in the least-significant bit.
    Flags,
}

impl FieldKind {
    /// Bytes this slot occupies on the wire.
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::Flags => 1,
            FieldKind::U16 => 2,
            FieldKind::F32 => 4,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::U8 => "u8",
            FieldKind::U16 => "u16",
            FieldKind::F32 => "f32",
            FieldKind::Flags => "flags",
        }
    }
}

const CONTROLLER_LAYOUT: [FieldKind; 9] = [FieldKind::U8; 9];
const HEARTBEAT_LAYOUT: [FieldKind; 1] = [FieldKind::U16];
const STATUS_LAYOUT: [FieldKind; 2] = [FieldKind::Flags, FieldKind::F32];
const QUIT_LAYOUT: [FieldKind; 0] = [];

impl CompactKind {
    pub const ALL: [CompactKind; 4] = [
        CompactKind::Controller,
        CompactKind::Heartbeat,
        CompactKind::Status,
        CompactKind::Quit,
    ];

    /// Look up a kind by its wire id.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    /// Wire id of this kind.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Field layout following the kind byte.
    pub fn layout(self) -> &'static [FieldKind] {
        match self {
            CompactKind::Controller => &CONTROLLER_LAYOUT,
            CompactKind::Heartbeat => &HEARTBEAT_LAYOUT,
            CompactKind::Status => &STATUS_LAYOUT,
            CompactKind::Quit => &QUIT_LAYOUT,
        }
    }

    /// Total frame length including the kind byte.
    pub fn frame_len(self) -> usize {
        1 + self.layout().iter().map(|field| field.width()).sum::<usize>()
    }

    pub fn name(self) -> &'static str {
        match self {
            CompactKind::Controller => "CONTROLLER",
            CompactKind::Heartbeat => "HEARTBEAT",
            CompactKind::Status => "STATUS",
            CompactKind::Quit => "QUIT",
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// Value for a `U8` or `U16` slot; range-checked against the slot width.
    Uint(u32),
    Float(f32),
    Flags([bool; 8]),
}

impl FieldValue {
    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Uint(_) => "uint",
            FieldValue::Float(_) => "float",
            FieldValue::Flags(_) => "flags",
        }
    }

    /// The integer value, if this is a `Uint`.
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            FieldValue::Uint(value) => Some(*value),
            _ => None,
        }
    }
}

/// A compact frame: kind plus positional fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactFrame {
    pub kind: CompactKind,
    pub fields: Vec<FieldValue>,
}

impl CompactFrame {
    /// Create a frame without validating the fields.
    pub fn new(kind: CompactKind, fields: Vec<FieldValue>) -> Self {
        Self { kind, fields }
    }

    /// Heartbeat stamped with the low 16 bits of `unix_secs`.
    pub fn heartbeat(unix_secs: u64) -> Self {
        Self::new(
            CompactKind::Heartbeat,
            vec![FieldValue::Uint((unix_secs & 0xFFFF) as u32)],
        )
    }

    pub fn quit() -> Self {
        Self::new(CompactKind::Quit, Vec::new())
    }

    /// Encode into `dst`, validating fields against the layout.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_compact(self.kind.id(), &self.fields, dst)
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        self.kind.frame_len()
    }
}

/// Fixed wire length of the frame identified by `kind`.
pub fn compact_len(kind: u8) -> Result<usize> {
    CompactKind::from_id(kind)
        .map(CompactKind::frame_len)
        .ok_or(FrameError::UnknownKind(kind))
}

/// Encode a compact frame.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────────────────────────────────┐
/// │ Kind (1B)│ Fields, packed back to back per the  │
/// │          │ kind's layout (no length field)      │
/// └──────────┴──────────────────────────────────────┘
/// ```
///
/// Nothing is written to `dst` unless every field is valid.
pub fn encode_compact(kind: u8, fields: &[FieldValue], dst: &mut BytesMut) -> Result<()> {
    let compact_kind = CompactKind::from_id(kind).ok_or(FrameError::UnknownKind(kind))?;
    let layout = compact_kind.layout();

    if fields.len() != layout.len() {
        return Err(FrameError::LayoutMismatch {
            kind,
            expected: format!("{} fields", layout.len()),
            actual: format!("{} fields", fields.len()),
        });
    }

    let mut frame = BytesMut::with_capacity(compact_kind.frame_len());
    frame.put_u8(kind);
    for (index, (slot, value)) in layout.iter().zip(fields).enumerate() {
        put_field(kind, index, *slot, value, &mut frame)?;
    }

    dst.extend_from_slice(&frame);
    Ok(())
}

fn put_field(
    kind: u8,
    index: usize,
    slot: FieldKind,
    value: &FieldValue,
    out: &mut BytesMut,
) -> Result<()> {
    let out_of_range = |value: u32, max: u64| FrameError::FieldOutOfRange {
        kind,
        index,
        value: u64::from(value),
        max,
    };

    match (slot, value) {
        (FieldKind::U8, FieldValue::Uint(v)) => {
            let byte = u8::try_from(*v).map_err(|_| out_of_range(*v, u64::from(u8::MAX)))?;
            out.put_u8(byte);
        }
        (FieldKind::U16, FieldValue::Uint(v)) => {
            let word = u16::try_from(*v).map_err(|_| out_of_range(*v, u64::from(u16::MAX)))?;
            out.put_u16(word);
        }
        (FieldKind::F32, FieldValue::Float(v)) => out.put_f32(*v),
        (FieldKind::Flags, FieldValue::Flags(bits)) => out.put_u8(pack_flags(bits)),
        _ => {
            return Err(FrameError::LayoutMismatch {
                kind,
                expected: format!("{} at field {index}", slot.name()),
                actual: value.type_name().to_string(),
            })
        }
    }
    Ok(())
}

/// Decode a compact frame from the front of `src`.
///
/// Only the kind's fixed length is read; trailing bytes are ignored because
/// the transport decides message boundaries.
pub fn decode_compact(src: &[u8]) -> Result<CompactFrame> {
    let (&id, _) = src.split_first().ok_or(FrameError::TruncatedFrame {
        needed: 1,
        available: 0,
    })?;
    let kind = CompactKind::from_id(id).ok_or(FrameError::UnknownKind(id))?;

    let needed = kind.frame_len();
    if src.len() < needed {
        return Err(FrameError::TruncatedFrame {
            needed,
            available: src.len(),
        });
    }

    let mut body = &src[1..needed];
    let fields = kind
        .layout()
        .iter()
        .map(|slot| match slot {
            FieldKind::U8 => FieldValue::Uint(u32::from(body.get_u8())),
            FieldKind::U16 => FieldValue::Uint(u32::from(body.get_u16())),
            FieldKind::F32 => FieldValue::Float(body.get_f32()),
            FieldKind::Flags => FieldValue::Flags(unpack_flags(body.get_u8())),
        })
        .collect();

    Ok(CompactFrame { kind, fields })
}

fn pack_flags(bits: &[bool; 8]) -> u8 {
    bits.iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .fold(0u8, |acc, (i, _)| acc | (1 << i))
}

fn unpack_flags(byte: u8) -> [bool; 8] {
    std::array::from_fn(|i| byte & (1 << i) != 0)
}
