use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Header: type (1) + msg id (4) + timestamp ms (8) + length (2) = 15 bytes.
pub const EXTENDED_HEADER_SIZE: usize = 15;

/// Largest payload the 2-byte length field can describe.
pub const MAX_EXTENDED_PAYLOAD: usize = u16::MAX as usize;

/// An extended frame with its payload still in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedFrame {
    pub msg_type: u8,
    pub msg_id: u32,
    /// Milliseconds since the unix epoch at send time.
    pub timestamp_ms: u64,
    pub payload: Bytes,
}

impl ExtendedFrame {
    /// Create a new frame.
    pub fn new(msg_type: u8, msg_id: u32, timestamp_ms: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            msg_id,
            timestamp_ms,
            payload: payload.into(),
        }
    }

    /// Encode this frame into `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_extended(
            self.msg_type,
            self.msg_id,
            self.timestamp_ms,
            &self.payload,
            dst,
        )
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        EXTENDED_HEADER_SIZE + self.payload.len()
    }
}

/// Encode an extended frame.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌──────────┬───────────┬──────────────┬───────────┬──────────────────┐
/// │ Type (1B)│ MsgId (4B)│ Timestamp ms │ Length    │ Payload          │
/// │          │           │ (8B)         │ (2B)      │ (Length bytes)   │
/// └──────────┴───────────┴──────────────┴───────────┴──────────────────┘
/// ```
pub fn encode_extended(
    msg_type: u8,
    msg_id: u32,
    timestamp_ms: u64,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: MAX_EXTENDED_PAYLOAD,
    })?;

    dst.reserve(EXTENDED_HEADER_SIZE + payload.len());
    dst.put_u8(msg_type);
    dst.put_u32(msg_id);
    dst.put_u64(timestamp_ms);
    dst.put_u16(len);
    dst.put_slice(payload);
    Ok(())
}

/// Total wire length of the frame at the front of `src`, if its header is present.
pub fn extended_frame_len(src: &[u8]) -> Option<usize> {
    if src.len() < EXTENDED_HEADER_SIZE {
        return None;
    }
    let len = u16::from_be_bytes([src[13], src[14]]) as usize;
    Some(EXTENDED_HEADER_SIZE + len)
}

/// Decode one extended frame from the front of `src`.
///
/// The LENGTH field is authoritative: exactly `15 + LENGTH` bytes are read
/// and anything after them is ignored.
pub fn decode_extended(src: &[u8]) -> Result<ExtendedFrame> {
    let total = extended_frame_len(src).ok_or(FrameError::TruncatedFrame {
        needed: EXTENDED_HEADER_SIZE,
        available: src.len(),
    })?;
    if src.len() < total {
        return Err(FrameError::TruncatedFrame {
            needed: total,
            available: src.len(),
        });
    }

    let mut header = &src[..EXTENDED_HEADER_SIZE];
    let msg_type = header.get_u8();
    let msg_id = header.get_u32();
    let timestamp_ms = header.get_u64();

    Ok(ExtendedFrame {
        msg_type,
        msg_id,
        timestamp_ms,
        payload: Bytes::copy_from_slice(&src[EXTENDED_HEADER_SIZE..total]),
    })
}

/// Take one extended frame off the front of a stream buffer.
///
/// Returns `None` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn split_extended(src: &mut BytesMut) -> Option<ExtendedFrame> {
    let total = extended_frame_len(src)?;
    if src.len() < total {
        return None;
    }

    let mut frame = src.split_to(total);
    let msg_type = frame.get_u8();
    let msg_id = frame.get_u32();
    let timestamp_ms = frame.get_u64();
    frame.advance(2);

    Some(ExtendedFrame {
        msg_type,
        msg_id,
        timestamp_ms,
        payload: frame.freeze(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_big_endian() {
        let mut buf = BytesMut::new();
        encode_extended(0x03, 0x0102_0304, 0x0A0B_0C0D_0E0F_1011, b"{}", &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[
                0x03, 0x01, 0x02, 0x03, 0x04, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11,
                0x00, 0x02, b'{', b'}'
            ]
        );
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_extended(0x02, 7, 1_700_000_000_123, br#"{"sensors":{}}"#, &mut buf).unwrap();

        let frame = decode_extended(&buf).unwrap();
        assert_eq!(frame.msg_type, 0x02);
        assert_eq!(frame.msg_id, 7);
        assert_eq!(frame.timestamp_ms, 1_700_000_000_123);
        assert_eq!(frame.payload.as_ref(), br#"{"sensors":{}}"#);
    }

    #[test]
    fn payload_size_boundary() {
        let mut buf = BytesMut::new();
        let max = vec![0u8; MAX_EXTENDED_PAYLOAD];
        encode_extended(0x01, 0, 0, &max, &mut buf).unwrap();
        assert_eq!(buf.len(), EXTENDED_HEADER_SIZE + MAX_EXTENDED_PAYLOAD);

        let mut buf = BytesMut::new();
        let over = vec![0u8; MAX_EXTENDED_PAYLOAD + 1];
        let err = encode_extended(0x01, 0, 0, &over, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooLarge {
                size: 65_536,
                max: 65_535
            }
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_short_header_is_truncated() {
        let err = decode_extended(&[0x03, 0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::TruncatedFrame {
                needed: 15,
                available: 3
            }
        ));
    }

    #[test]
    fn decode_short_payload_is_truncated() {
        let mut buf = BytesMut::new();
        encode_extended(0x01, 1, 2, b"hello", &mut buf).unwrap();
        buf.truncate(EXTENDED_HEADER_SIZE + 2);

        let err = decode_extended(&buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::TruncatedFrame {
                needed: 20,
                available: 17
            }
        ));
    }

    #[test]
    fn trailing_bytes_are_not_payload() {
        let mut buf = BytesMut::new();
        encode_extended(0x01, 1, 2, b"abc", &mut buf).unwrap();
        buf.put_slice(b"garbage");

        let frame = decode_extended(&buf).unwrap();
        assert_eq!(frame.payload.as_ref(), b"abc");
    }

    #[test]
    fn split_multiple_frames_from_stream() {
        let mut buf = BytesMut::new();
        encode_extended(0x01, 1, 10, b"first", &mut buf).unwrap();
        encode_extended(0x02, 2, 20, b"second", &mut buf).unwrap();

        let f1 = split_extended(&mut buf).unwrap();
        let f2 = split_extended(&mut buf).unwrap();
        assert_eq!((f1.msg_id, f1.payload.as_ref()), (1, b"first".as_ref()));
        assert_eq!((f2.msg_id, f2.payload.as_ref()), (2, b"second".as_ref()));
        assert!(buf.is_empty());
        assert!(split_extended(&mut buf).is_none());
    }

    #[test]
    fn split_waits_for_complete_frame() {
        let mut wire = BytesMut::new();
        encode_extended(0x03, 9, 90, b"{\"status\":\"alive\"}", &mut wire).unwrap();

        let mut buf = BytesMut::new();
        for byte in &wire[..wire.len() - 1] {
            buf.put_u8(*byte);
            assert!(split_extended(&mut buf).is_none());
        }
        buf.put_u8(wire[wire.len() - 1]);
        let frame = split_extended(&mut buf).unwrap();
        assert_eq!(frame.msg_id, 9);
    }

    #[test]
    fn empty_payload() {
        let frame = ExtendedFrame::new(0x03, 0, 0, Bytes::new());
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), frame.wire_size());
        assert_eq!(decode_extended(&buf).unwrap(), frame);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(any::<u8>(), 0..=4096)
        }

        proptest! {
            #[test]
            fn prop_roundtrip_preserves_all_fields(
                msg_type in any::<u8>(),
                msg_id in any::<u32>(),
                timestamp_ms in any::<u64>(),
                payload in payload_strategy(),
            ) {
                let mut buf = BytesMut::new();
                encode_extended(msg_type, msg_id, timestamp_ms, &payload, &mut buf).unwrap();

                let frame = decode_extended(&buf).unwrap();
                prop_assert_eq!(frame.msg_type, msg_type);
                prop_assert_eq!(frame.msg_id, msg_id);
                prop_assert_eq!(frame.timestamp_ms, timestamp_ms);
                prop_assert_eq!(frame.payload.as_ref(), payload.as_slice());
            }

            #[test]
            fn prop_every_prefix_is_truncated(
                msg_type in any::<u8>(),
                payload in prop::collection::vec(any::<u8>(), 0..=64),
            ) {
                let mut buf = BytesMut::new();
                encode_extended(msg_type, 1, 2, &payload, &mut buf).unwrap();

                for cut in 0..buf.len() {
                    let is_truncated = matches!(
                        decode_extended(&buf[..cut]),
                        Err(FrameError::TruncatedFrame { .. })
                    );
                    prop_assert!(is_truncated);
                }
            }
        }
    }
}
