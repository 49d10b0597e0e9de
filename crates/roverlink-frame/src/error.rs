/// Errors that can occur during frame encoding/decoding.
///
/// All variants are scoped to a single frame: the receive path drops the
/// frame and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The kind byte has no registered compact layout.
    #[error("unknown frame kind 0x{0:02X}")]
    UnknownKind(u8),

    /// A field value does not fit its slot in the layout.
    #[error("field {index} of kind 0x{kind:02X} out of range ({value}, max {max})")]
    FieldOutOfRange {
        kind: u8,
        index: usize,
        value: u64,
        max: u64,
    },

    /// The fields given do not match the layout (count or field type).
    #[error("fields do not match layout of kind 0x{kind:02X}: expected {expected}, got {actual}")]
    LayoutMismatch {
        kind: u8,
        expected: String,
        actual: String,
    },

    /// Fewer bytes are available than the frame requires.
    #[error("truncated frame ({available} bytes, need {needed})")]
    TruncatedFrame { needed: usize, available: usize },

    /// The payload exceeds what the length field can describe.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame was well formed but its payload could not be parsed.
    #[error("payload of message type 0x{msg_type:02X} could not be decoded: {source}")]
    PayloadDecode {
        msg_type: u8,
        source: serde_json::Error,
    },

    /// A payload could not be serialized.
    #[error("payload could not be encoded: {0}")]
    PayloadEncode(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
