//! Operator controller state and its packing into the controller compact frame.
//!
//! Layout of the nine field bytes after the `0xDE` kind byte:
//!
//! ```text
//! index: 0          1           2        3        4           5..=8
//!        left drive right drive xbox[0]  xbox[1]  n64 marker  n64[0..4]
//! ```
//!
//! Every transmitted button occupies two bits, four per byte, with the
//! first slot in the least-significant pair. A pressed button is `0b10`
//! and a released one `0b01`, so a single flipped bit never reads as
//! pressed. Unassigned slots stay `0b00`.
//!
//! ```text
//! xbox[0]  A      B       X       Y
//! xbox[1]  LB     RB      LT      RT
//! n64[0]   A      B       L       R
//! n64[1]   C up   C down  C left  C right
//! n64[2]   D up   D down  D left  D right
//! n64[3]   Z      -       -       -
//! ```
//!
//! Select and Start on both pads are local mode toggles and never leave
//! the basestation.

use serde::{Deserialize, Serialize};

use crate::compact::{CompactFrame, CompactKind, FieldValue};
use crate::error::{FrameError, Result};

pub const AXIS_MIN: u8 = 0;
pub const AXIS_NEUTRAL: u8 = 100;
pub const AXIS_MAX: u8 = 200;

/// Marker byte placed in front of the n64 button bytes.
pub const N64_MARKER: u8 = 0xDE;

pub const BUTTON_ON: u8 = 0b10;
pub const BUTTON_OFF: u8 = 0b01;

const BUTTONS_PER_BYTE: usize = 4;
const XBOX_BUTTON_COUNT: usize = 10;
const N64_BUTTON_COUNT: usize = 14;
const XBOX_BYTES: usize = 2;
const N64_BYTES: usize = 4;

type Slots<B, const N: usize> = [[Option<B>; BUTTONS_PER_BYTE]; N];

const XBOX_SLOTS: Slots<XboxButton, XBOX_BYTES> = [
    [
        Some(XboxButton::A),
        Some(XboxButton::B),
        Some(XboxButton::X),
        Some(XboxButton::Y),
    ],
    [
        Some(XboxButton::LeftBumper),
        Some(XboxButton::RightBumper),
        Some(XboxButton::LeftTrigger),
        Some(XboxButton::RightTrigger),
    ],
];

const N64_SLOTS: Slots<N64Button, N64_BYTES> = [
    [
        Some(N64Button::A),
        Some(N64Button::B),
        Some(N64Button::L),
        Some(N64Button::R),
    ],
    [
        Some(N64Button::CUp),
        Some(N64Button::CDown),
        Some(N64Button::CLeft),
        Some(N64Button::CRight),
    ],
    [
        Some(N64Button::DpadUp),
        Some(N64Button::DpadDown),
        Some(N64Button::DpadLeft),
        Some(N64Button::DpadRight),
    ],
    [Some(N64Button::Z), None, None, None],
];

/// Xbox controller inputs reported as buttons. The triggers count as
/// pressed past their threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XboxButton {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    LeftTrigger,
    RightTrigger,
    Select,
    Start,
}

impl XboxButton {
    pub const ALL: [XboxButton; XBOX_BUTTON_COUNT] = [
        XboxButton::A,
        XboxButton::B,
        XboxButton::X,
        XboxButton::Y,
        XboxButton::LeftBumper,
        XboxButton::RightBumper,
        XboxButton::LeftTrigger,
        XboxButton::RightTrigger,
        XboxButton::Select,
        XboxButton::Start,
    ];

    pub fn name(self) -> &'static str {
        match self {
            XboxButton::A => "a",
            XboxButton::B => "b",
            XboxButton::X => "x",
            XboxButton::Y => "y",
            XboxButton::LeftBumper => "left_bumper",
            XboxButton::RightBumper => "right_bumper",
            XboxButton::LeftTrigger => "left_trigger",
            XboxButton::RightTrigger => "right_trigger",
            XboxButton::Select => "select",
            XboxButton::Start => "start",
        }
    }

    /// Whether the button has a slot in the controller frame.
    pub fn on_wire(self) -> bool {
        XBOX_SLOTS.iter().flatten().any(|slot| *slot == Some(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum N64Button {
    A,
    B,
    L,
    R,
    CUp,
    CDown,
    CLeft,
    CRight,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    Z,
    Start,
}

impl N64Button {
    pub const ALL: [N64Button; N64_BUTTON_COUNT] = [
        N64Button::A,
        N64Button::B,
        N64Button::L,
        N64Button::R,
        N64Button::CUp,
        N64Button::CDown,
        N64Button::CLeft,
        N64Button::CRight,
        N64Button::DpadUp,
        N64Button::DpadDown,
        N64Button::DpadLeft,
        N64Button::DpadRight,
        N64Button::Z,
        N64Button::Start,
    ];

    pub fn name(self) -> &'static str {
        match self {
            N64Button::A => "a",
            N64Button::B => "b",
            N64Button::L => "l",
            N64Button::R => "r",
            N64Button::CUp => "c_up",
            N64Button::CDown => "c_down",
            N64Button::CLeft => "c_left",
            N64Button::CRight => "c_right",
            N64Button::DpadUp => "dpad_up",
            N64Button::DpadDown => "dpad_down",
            N64Button::DpadLeft => "dpad_left",
            N64Button::DpadRight => "dpad_right",
            N64Button::Z => "z",
            N64Button::Start => "start",
        }
    }

    /// Whether the button has a slot in the controller frame.
    pub fn on_wire(self) -> bool {
        N64_SLOTS.iter().flatten().any(|slot| *slot == Some(self))
    }
}

/// Pressed state of every Xbox input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct XboxButtons([bool; XBOX_BUTTON_COUNT]);

impl XboxButtons {
    pub fn set(&mut self, button: XboxButton, pressed: bool) {
        self.0[button as usize] = pressed;
    }

    pub fn is_pressed(&self, button: XboxButton) -> bool {
        self.0[button as usize]
    }

    fn to_bytes(self) -> [u8; XBOX_BYTES] {
        pack_slots(&XBOX_SLOTS, |button| self.is_pressed(button))
    }

    fn from_bytes(bytes: [u8; XBOX_BYTES]) -> Self {
        let mut buttons = Self::default();
        unpack_slots(&XBOX_SLOTS, &bytes, |button, pressed| {
            buttons.set(button, pressed)
        });
        buttons
    }
}

/// Pressed state of every N64 button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct N64Buttons([bool; N64_BUTTON_COUNT]);

impl N64Buttons {
    pub fn set(&mut self, button: N64Button, pressed: bool) {
        self.0[button as usize] = pressed;
    }

    pub fn is_pressed(&self, button: N64Button) -> bool {
        self.0[button as usize]
    }

    fn to_bytes(self) -> [u8; N64_BYTES] {
        pack_slots(&N64_SLOTS, |button| self.is_pressed(button))
    }

    fn from_bytes(bytes: [u8; N64_BYTES]) -> Self {
        let mut buttons = Self::default();
        unpack_slots(&N64_SLOTS, &bytes, |button, pressed| {
            buttons.set(button, pressed)
        });
        buttons
    }
}

fn pack_slots<B: Copy, const N: usize>(
    slots: &Slots<B, N>,
    pressed: impl Fn(B) -> bool,
) -> [u8; N] {
    let mut bytes = [0u8; N];
    for (byte, row) in bytes.iter_mut().zip(slots) {
        *byte = row.iter().enumerate().fold(0u8, |acc, (pair, slot)| {
            let state = match slot {
                Some(button) if pressed(*button) => BUTTON_ON,
                Some(_) => BUTTON_OFF,
                None => 0,
            };
            acc | (state << (pair * 2))
        });
    }
    bytes
}

fn unpack_slots<B: Copy, const N: usize>(
    slots: &Slots<B, N>,
    bytes: &[u8; N],
    mut apply: impl FnMut(B, bool),
) {
    for (byte, row) in bytes.iter().zip(slots) {
        for (pair, slot) in row.iter().enumerate() {
            if let Some(button) = slot {
                apply(*button, (byte >> (pair * 2)) & 0b11 == BUTTON_ON);
            }
        }
    }
}

/// One sample of operator input as sent to the rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerCommand {
    /// Left drive axis, `0..=200` with 100 at rest.
    pub left_axis: u8,
    /// Right drive axis, `0..=200` with 100 at rest.
    pub right_axis: u8,
    pub xbox: XboxButtons,
    pub n64: N64Buttons,
    /// Drive backwards: the two drive axes trade places on the wire.
    pub reverse: bool,
}

impl Default for ControllerCommand {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ControllerCommand {
    /// Both sticks centred, nothing pressed.
    pub const fn neutral() -> Self {
        Self {
            left_axis: AXIS_NEUTRAL,
            right_axis: AXIS_NEUTRAL,
            xbox: XboxButtons([false; XBOX_BUTTON_COUNT]),
            n64: N64Buttons([false; N64_BUTTON_COUNT]),
            reverse: false,
        }
    }

    /// Field values for the controller compact frame.
    pub fn to_fields(&self) -> Result<Vec<FieldValue>> {
        let kind = CompactKind::Controller.id();
        for (index, axis) in [self.left_axis, self.right_axis].into_iter().enumerate() {
            if axis > AXIS_MAX {
                return Err(FrameError::FieldOutOfRange {
                    kind,
                    index,
                    value: u64::from(axis),
                    max: u64::from(AXIS_MAX),
                });
            }
        }

        let (left, right) = if self.reverse {
            (self.right_axis, self.left_axis)
        } else {
            (self.left_axis, self.right_axis)
        };

        let mut bytes = Vec::with_capacity(CompactKind::Controller.layout().len());
        bytes.extend([left, right]);
        bytes.extend(self.xbox.to_bytes());
        bytes.push(N64_MARKER);
        bytes.extend(self.n64.to_bytes());

        Ok(bytes.into_iter().map(|b| FieldValue::Uint(u32::from(b))).collect())
    }

    pub fn to_frame(&self) -> Result<CompactFrame> {
        Ok(CompactFrame::new(CompactKind::Controller, self.to_fields()?))
    }

    /// Rebuild a command from decoded controller fields.
    ///
    /// The wire carries no reverse flag, so the result always has
    /// `reverse == false` with the axes as they were sent. The marker byte
    /// is not checked.
    pub fn from_fields(fields: &[FieldValue]) -> Result<Self> {
        let kind = CompactKind::Controller.id();
        let expected = CompactKind::Controller.layout().len();
        if fields.len() != expected {
            return Err(FrameError::LayoutMismatch {
                kind,
                expected: format!("{expected} fields"),
                actual: format!("{} fields", fields.len()),
            });
        }

        let mut bytes = [0u8; 9];
        for (index, (field, byte)) in fields.iter().zip(bytes.iter_mut()).enumerate() {
            let value = field.as_uint().ok_or_else(|| FrameError::LayoutMismatch {
                kind,
                expected: format!("u8 at field {index}"),
                actual: format!("{field:?}"),
            })?;
            *byte = u8::try_from(value).map_err(|_| FrameError::FieldOutOfRange {
                kind,
                index,
                value: u64::from(value),
                max: u64::from(u8::MAX),
            })?;
        }

        Ok(Self {
            left_axis: bytes[0],
            right_axis: bytes[1],
            xbox: XboxButtons::from_bytes([bytes[2], bytes[3]]),
            n64: N64Buttons::from_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
            reverse: false,
        })
    }

    pub fn from_frame(frame: &CompactFrame) -> Result<Self> {
        if frame.kind != CompactKind::Controller {
            return Err(FrameError::LayoutMismatch {
                kind: frame.kind.id(),
                expected: "controller frame".to_string(),
                actual: frame.kind.name().to_string(),
            });
        }
        Self::from_fields(&frame.fields)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::compact::decode_compact;

    fn wire(command: &ControllerCommand) -> Vec<u8> {
        let mut buf = BytesMut::new();
        command.to_frame().unwrap().encode(&mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn neutral_command_wire_bytes() {
        assert_eq!(
            wire(&ControllerCommand::neutral()),
            vec![0xDE, 100, 100, 0x55, 0x55, 0xDE, 0x55, 0x55, 0x55, 0x01]
        );
    }

    #[test]
    fn first_button_uses_low_bits() {
        let mut command = ControllerCommand::neutral();
        command.xbox.set(XboxButton::A, true);
        command.xbox.set(XboxButton::RightTrigger, true);
        command.n64.set(N64Button::A, true);
        command.n64.set(N64Button::DpadRight, true);

        let bytes = wire(&command);
        assert_eq!(bytes[3], 0b0101_0110);
        assert_eq!(bytes[4], 0b1001_0101);
        assert_eq!(bytes[6], 0x56);
        assert_eq!(bytes[8], 0b1001_0101);
    }

    #[test]
    fn n64_bytes_follow_rover_layout() {
        let mut command = ControllerCommand::neutral();
        command.n64.set(N64Button::CDown, true);
        command.n64.set(N64Button::Z, true);

        let bytes = wire(&command);
        assert_eq!(bytes[6], 0x55);
        assert_eq!(bytes[7], 0b0101_1001);
        assert_eq!(bytes[8], 0x55);
        // Z alone in the low pair, the rest unassigned
        assert_eq!(bytes[9], 0b0000_0010);
    }

    #[test]
    fn local_toggles_stay_off_the_wire() {
        let mut command = ControllerCommand::neutral();
        command.xbox.set(XboxButton::Select, true);
        command.xbox.set(XboxButton::Start, true);
        command.n64.set(N64Button::Start, true);

        assert_eq!(wire(&command), wire(&ControllerCommand::neutral()));
        assert!(!XboxButton::Start.on_wire());
        assert!(!N64Button::Start.on_wire());
        assert!(XboxButton::LeftTrigger.on_wire());
        assert!(N64Button::Z.on_wire());
    }

    #[test]
    fn reverse_swaps_drive_axes() {
        let command = ControllerCommand {
            left_axis: 180,
            right_axis: 20,
            reverse: true,
            ..ControllerCommand::neutral()
        };
        let bytes = wire(&command);
        assert_eq!((bytes[1], bytes[2]), (20, 180));
    }

    #[test]
    fn axis_above_max_rejected() {
        let command = ControllerCommand {
            right_axis: 201,
            ..ControllerCommand::neutral()
        };
        assert!(matches!(
            command.to_fields(),
            Err(FrameError::FieldOutOfRange {
                index: 1,
                value: 201,
                max: 200,
                ..
            })
        ));
    }

    #[test]
    fn decoded_frame_rebuilds_command() {
        let mut command = ControllerCommand {
            left_axis: 150,
            right_axis: 0,
            ..ControllerCommand::neutral()
        };
        command.xbox.set(XboxButton::Y, true);
        command.xbox.set(XboxButton::LeftTrigger, true);
        command.n64.set(N64Button::Z, true);
        command.n64.set(N64Button::CDown, true);

        let frame = decode_compact(&wire(&command)).unwrap();
        assert_eq!(ControllerCommand::from_frame(&frame).unwrap(), command);
    }

    #[test]
    fn corrupted_pair_reads_as_released() {
        let mut fields = ControllerCommand::neutral().to_fields().unwrap();
        // 0b11 in the first pair is neither on nor off
        fields[2] = FieldValue::Uint(0b0101_0111);
        let command = ControllerCommand::from_fields(&fields).unwrap();
        assert!(!command.xbox.is_pressed(XboxButton::A));
    }

    #[test]
    fn wrong_kind_rejected() {
        let frame = CompactFrame::heartbeat(1);
        assert!(matches!(
            ControllerCommand::from_frame(&frame),
            Err(FrameError::LayoutMismatch { kind: 0xAA, .. })
        ));
    }
}
