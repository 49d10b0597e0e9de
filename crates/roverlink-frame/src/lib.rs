//! Wire codecs for the rover control link.
//!
//! Two encodings share the link:
//! - compact frames: a kind byte followed by fixed-width fields, no length
//!   field (the controller frame is 10 bytes)
//! - extended frames: `TYPE | MSG_ID | TIMESTAMP_MS | LENGTH | PAYLOAD`,
//!   big-endian, with a JSON payload
//!
//! Message boundaries come from the transport (one datagram per frame) or,
//! on a byte stream, from `FrameAssembler`.

pub mod assembler;
pub mod command;
pub mod compact;
pub mod error;
pub mod extended;
pub mod kinds;
pub mod wire;

pub use assembler::{drain_frames, FrameAssembler};
pub use command::{
    ControllerCommand, N64Button, N64Buttons, XboxButton, XboxButtons, AXIS_MAX, AXIS_MIN,
    AXIS_NEUTRAL, BUTTON_OFF, BUTTON_ON, N64_MARKER,
};
pub use compact::{
    compact_len, decode_compact, encode_compact, CompactFrame, CompactKind, FieldKind, FieldValue,
    MAX_COMPACT_LEN,
};
pub use error::{FrameError, Result};
pub use extended::{
    decode_extended, encode_extended, extended_frame_len, split_extended, ExtendedFrame,
    EXTENDED_HEADER_SIZE, MAX_EXTENDED_PAYLOAD,
};
pub use kinds::{
    type_name, CommandPayload, ControllerDataPayload, ErrorPayload, ExtendedMessage, GpsPayload,
    HeartbeatPayload, MessageType, Payload, QuitPayload, TelemetryPayload,
};
pub use wire::{decode_datagram, Frame, ProtocolVersion};
