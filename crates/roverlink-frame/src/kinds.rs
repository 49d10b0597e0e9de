//! Extended message types and their JSON payloads.
//!
//! The set of message types is closed: every known type byte maps to one
//! `Payload` variant, and any other byte decodes to `Payload::Unrecognized`
//! with the raw payload kept intact.

use std::borrow::Cow;
use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::command::{ControllerCommand, N64Button, XboxButton, BUTTON_OFF, BUTTON_ON};
use crate::error::{FrameError, Result};
use crate::extended::{decode_extended, ExtendedFrame};

/// Known extended message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageType {
    Command = 0x01,
    Telemetry = 0x02,
    Heartbeat = 0x03,
    ControllerData = 0x04,
    Error = 0x08,
    GpsData = 0x12,
    Quit = 0xFF,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::Command,
        MessageType::Telemetry,
        MessageType::Heartbeat,
        MessageType::ControllerData,
        MessageType::Error,
        MessageType::GpsData,
        MessageType::Quit,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.id() == id)
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::Command => "COMMAND",
            MessageType::Telemetry => "TELEMETRY",
            MessageType::Heartbeat => "HEARTBEAT",
            MessageType::ControllerData => "CONTROLLER_DATA",
            MessageType::Error => "ERROR",
            MessageType::GpsData => "GPS_DATA",
            MessageType::Quit => "QUIT",
        }
    }

    /// Parse a type from its name (case-insensitive) or a `0x..` / decimal id.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(hex) = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
        {
            return u8::from_str_radix(hex, 16).ok().and_then(Self::from_id);
        }
        if let Ok(id) = text.parse::<u8>() {
            return Self::from_id(id);
        }
        let upper = text.to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|ty| ty.name() == upper)
    }
}

/// Readable name for any type byte, `UNKNOWN_XX` outside the table.
pub fn type_name(id: u8) -> Cow<'static, str> {
    match MessageType::from_id(id) {
        Some(ty) => Cow::Borrowed(ty.name()),
        None => Cow::Owned(format!("UNKNOWN_{id:02X}")),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    #[serde(default)]
    pub sensors: Map<String, Value>,
    #[serde(default)]
    pub system: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default = "default_status")]
    pub status: String,
}

impl Default for HeartbeatPayload {
    fn default() -> Self {
        Self {
            status: default_status(),
        }
    }
}

fn default_status() -> String {
    "alive".to_string()
}

/// Controller state in the extended format: each input by name, with axis
/// values as sent and buttons as their 2-bit wire state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerDataPayload {
    #[serde(default)]
    pub xbox: BTreeMap<String, i64>,
    #[serde(default)]
    pub n64: BTreeMap<String, i64>,
    #[serde(default)]
    pub reverse_mode: bool,
}

impl From<&ControllerCommand> for ControllerDataPayload {
    fn from(command: &ControllerCommand) -> Self {
        let state = |pressed: bool| i64::from(if pressed { BUTTON_ON } else { BUTTON_OFF });

        let mut xbox = BTreeMap::new();
        xbox.insert("left_axis".to_string(), i64::from(command.left_axis));
        xbox.insert("right_axis".to_string(), i64::from(command.right_axis));
        for button in XboxButton::ALL {
            xbox.insert(
                button.name().to_string(),
                state(command.xbox.is_pressed(button)),
            );
        }

        let n64 = N64Button::ALL
            .into_iter()
            .map(|button| {
                (
                    button.name().to_string(),
                    state(command.n64.is_pressed(button)),
                )
            })
            .collect();

        Self {
            xbox,
            n64,
            reverse_mode: command.reverse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPayload {
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
    #[serde(default)]
    pub acc: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuitPayload {
    #[serde(default)]
    pub reason: String,
}

/// A decoded extended payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Command(CommandPayload),
    Telemetry(TelemetryPayload),
    Heartbeat(HeartbeatPayload),
    ControllerData(ControllerDataPayload),
    Error(ErrorPayload),
    Gps(GpsPayload),
    Quit(QuitPayload),
    /// A type byte outside the table; the payload is passed through untouched.
    Unrecognized { type_id: u8, raw: Bytes },
}

impl Payload {
    /// Type byte this payload is sent under.
    pub fn type_id(&self) -> u8 {
        match self {
            Payload::Unrecognized { type_id, .. } => *type_id,
            known => known
                .message_type()
                .map(MessageType::id)
                .unwrap_or_default(),
        }
    }

    pub fn message_type(&self) -> Option<MessageType> {
        Some(match self {
            Payload::Command(_) => MessageType::Command,
            Payload::Telemetry(_) => MessageType::Telemetry,
            Payload::Heartbeat(_) => MessageType::Heartbeat,
            Payload::ControllerData(_) => MessageType::ControllerData,
            Payload::Error(_) => MessageType::Error,
            Payload::Gps(_) => MessageType::GpsData,
            Payload::Quit(_) => MessageType::Quit,
            Payload::Unrecognized { .. } => return None,
        })
    }

    /// Parse the payload bytes for `type_id`.
    ///
    /// Unknown types never fail; malformed JSON for a known type is a
    /// `PayloadDecode` error scoped to this one message.
    pub fn decode(type_id: u8, bytes: &[u8]) -> Result<Self> {
        let Some(ty) = MessageType::from_id(type_id) else {
            return Ok(Payload::Unrecognized {
                type_id,
                raw: Bytes::copy_from_slice(bytes),
            });
        };

        Ok(match ty {
            MessageType::Command => Payload::Command(parse(type_id, bytes)?),
            MessageType::Telemetry => Payload::Telemetry(parse(type_id, bytes)?),
            MessageType::Heartbeat => Payload::Heartbeat(parse(type_id, bytes)?),
            MessageType::ControllerData => Payload::ControllerData(parse(type_id, bytes)?),
            MessageType::Error => Payload::Error(parse(type_id, bytes)?),
            MessageType::GpsData => Payload::Gps(parse(type_id, bytes)?),
            MessageType::Quit => Payload::Quit(parse(type_id, bytes)?),
        })
    }

    /// Serialize to payload bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encoded = match self {
            Payload::Command(p) => serde_json::to_vec(p),
            Payload::Telemetry(p) => serde_json::to_vec(p),
            Payload::Heartbeat(p) => serde_json::to_vec(p),
            Payload::ControllerData(p) => serde_json::to_vec(p),
            Payload::Error(p) => serde_json::to_vec(p),
            Payload::Gps(p) => serde_json::to_vec(p),
            Payload::Quit(p) => serde_json::to_vec(p),
            Payload::Unrecognized { raw, .. } => return Ok(raw.to_vec()),
        };
        encoded.map_err(FrameError::PayloadEncode)
    }

    /// Build a payload for `type_id` from a JSON value, e.g. one typed on a
    /// command line.
    pub fn from_json(type_id: u8, value: &Value) -> Result<Self> {
        let bytes = serde_json::to_vec(value).map_err(FrameError::PayloadEncode)?;
        Self::decode(type_id, &bytes)
    }

    /// The payload as a JSON value. Unrecognized payloads are parsed if they
    /// hold JSON and rendered as a string otherwise.
    pub fn to_json(&self) -> Value {
        match self {
            Payload::Unrecognized { raw, .. } => serde_json::from_slice(raw)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned())),
            known => known
                .to_bytes()
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok())
                .unwrap_or(Value::Null),
        }
    }
}

fn parse<T: DeserializeOwned>(msg_type: u8, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| FrameError::PayloadDecode { msg_type, source })
}

/// An extended frame with its payload interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedMessage {
    pub msg_id: u32,
    pub timestamp_ms: u64,
    pub payload: Payload,
}

impl ExtendedMessage {
    pub fn new(msg_id: u32, timestamp_ms: u64, payload: Payload) -> Self {
        Self {
            msg_id,
            timestamp_ms,
            payload,
        }
    }

    pub fn type_id(&self) -> u8 {
        self.payload.type_id()
    }

    pub fn from_frame(frame: &ExtendedFrame) -> Result<Self> {
        Ok(Self {
            msg_id: frame.msg_id,
            timestamp_ms: frame.timestamp_ms,
            payload: Payload::decode(frame.msg_type, &frame.payload)?,
        })
    }

    pub fn to_frame(&self) -> Result<ExtendedFrame> {
        Ok(ExtendedFrame::new(
            self.type_id(),
            self.msg_id,
            self.timestamp_ms,
            self.payload.to_bytes()?,
        ))
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        self.to_frame()?.encode(dst)
    }

    /// Decode a frame and its payload from the front of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        Self::from_frame(&decode_extended(src)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::extended::encode_extended;

    #[test]
    fn heartbeat_message_roundtrip() {
        let msg = ExtendedMessage::new(
            5,
            1_700_000_000_000,
            Payload::Heartbeat(HeartbeatPayload::default()),
        );
        let mut buf = BytesMut::new();
        msg.encode(&mut buf).unwrap();

        assert_eq!(buf[0], 0x03);
        assert_eq!(&buf[15..], br#"{"status":"alive"}"#);
        assert_eq!(ExtendedMessage::decode(&buf).unwrap(), msg);
    }

    #[test]
    fn unknown_type_is_passed_through() {
        let mut buf = BytesMut::new();
        encode_extended(0x42, 1, 2, b"\x00\x01not json", &mut buf).unwrap();

        let msg = ExtendedMessage::decode(&buf).unwrap();
        assert_eq!(
            msg.payload,
            Payload::Unrecognized {
                type_id: 0x42,
                raw: Bytes::from_static(b"\x00\x01not json"),
            }
        );
        assert_eq!(msg.type_id(), 0x42);
        assert_eq!(msg.to_frame().unwrap().payload.as_ref(), b"\x00\x01not json");
    }

    #[test]
    fn malformed_json_is_payload_decode_error() {
        let mut buf = BytesMut::new();
        encode_extended(0x02, 1, 2, b"{not json", &mut buf).unwrap();

        let err = ExtendedMessage::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadDecode { msg_type: 0x02, .. }));
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let payload = Payload::decode(0x12, br#"{"lat":45.5,"lon":-73.6}"#).unwrap();
        assert_eq!(
            payload,
            Payload::Gps(GpsPayload {
                lat: 45.5,
                lon: -73.6,
                alt: 0.0,
                acc: 0.0,
            })
        );

        let payload = Payload::decode(0x03, b"{}").unwrap();
        assert_eq!(payload, Payload::Heartbeat(HeartbeatPayload::default()));
    }

    #[test]
    fn type_names() {
        assert_eq!(type_name(0x01), "COMMAND");
        assert_eq!(type_name(0x12), "GPS_DATA");
        assert_eq!(type_name(0x7A), "UNKNOWN_7A");
    }

    #[test]
    fn parse_type_from_cli_text() {
        assert_eq!(MessageType::parse("telemetry"), Some(MessageType::Telemetry));
        assert_eq!(MessageType::parse("gps-data"), Some(MessageType::GpsData));
        assert_eq!(MessageType::parse("0xff"), Some(MessageType::Quit));
        assert_eq!(MessageType::parse("8"), Some(MessageType::Error));
        assert_eq!(MessageType::parse("0x42"), None);
        assert_eq!(MessageType::parse("bogus"), None);
    }

    #[test]
    fn payload_from_json_value() {
        let payload = Payload::from_json(
            0x01,
            &json!({"command": "arm", "parameters": {"speed": 3}}),
        )
        .unwrap();
        let Payload::Command(command) = &payload else {
            panic!("expected command payload, got {payload:?}");
        };
        assert_eq!(command.command, "arm");
        assert_eq!(command.parameters["speed"], json!(3));
        assert_eq!(payload.to_json()["command"], json!("arm"));
    }

    #[test]
    fn controller_data_from_command() {
        let mut command = ControllerCommand::neutral();
        command.xbox.set(XboxButton::B, true);
        command.reverse = true;

        let payload = ControllerDataPayload::from(&command);
        assert_eq!(payload.xbox["left_axis"], 100);
        assert_eq!(payload.xbox["b"], i64::from(BUTTON_ON));
        assert_eq!(payload.xbox["a"], i64::from(BUTTON_OFF));
        assert_eq!(payload.n64.len(), N64Button::ALL.len());
        assert!(payload.reverse_mode);
    }

    #[test]
    fn empty_object_decodes_with_defaults() {
        let Payload::Command(command) = Payload::decode(0x01, b"{}").unwrap() else {
            panic!("expected command payload");
        };
        assert_eq!(command.command, "");
        assert!(command.parameters.is_empty());

        let Payload::Error(error) = Payload::decode(0x08, b"{}").unwrap() else {
            panic!("expected error payload");
        };
        assert_eq!(error.error_code, 0);
        assert_eq!(error.message, "");

        let Payload::Gps(gps) = Payload::decode(0x12, b"{}").unwrap() else {
            panic!("expected gps payload");
        };
        assert_eq!((gps.lat, gps.lon, gps.alt, gps.acc), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn controller_data_accepts_wide_axis_values() {
        let payload = Payload::decode(
            0x04,
            br#"{"xbox":{"left_axis":1000,"right_axis":-5},"n64":{"a":2}}"#,
        )
        .unwrap();
        let Payload::ControllerData(data) = &payload else {
            panic!("expected controller data, got {payload:?}");
        };
        assert_eq!(data.xbox["left_axis"], 1000);
        assert_eq!(data.xbox["right_axis"], -5);
        assert_eq!(data.n64["a"], 2);
        assert!(!data.reverse_mode);
    }
}
