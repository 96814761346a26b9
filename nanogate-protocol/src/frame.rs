//! Binary frame format for the node IPC link.
//!
//! Request frame (8 bytes header + payload):
//!
//! ```text
//! +------+----------+----------+----------+-------------+---------+
//! | 'N'  | encoding | reserved | reserved | payload_len | payload |
//! | 1 B  |   1 B    |   1 B    |   1 B    | 4 bytes BE  |         |
//! +------+----------+----------+----------+-------------+---------+
//! ```
//!
//! Response frame (4 bytes header + payload):
//!
//! ```text
//! +-------------+---------+
//! | payload_len | payload |
//! | 4 bytes BE  |         |
//! +-------------+---------+
//! ```
//!
//! A zero length is a valid, empty payload.

use crate::error::ProtocolError;
use crate::{ENCODING_VERSION, PREAMBLE_LEAD, PREAMBLE_RESERVED};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Request preamble.
pub const PREAMBLE: [u8; 4] = [
    PREAMBLE_LEAD,
    ENCODING_VERSION,
    PREAMBLE_RESERVED,
    PREAMBLE_RESERVED,
];

/// Size of the request preamble in bytes.
pub const PREAMBLE_SIZE: usize = 4;

/// Size of the length field in bytes.
pub const LENGTH_SIZE: usize = 4;

/// Size of the fixed request header (preamble + length).
pub const REQUEST_HEADER_SIZE: usize = PREAMBLE_SIZE + LENGTH_SIZE;

/// Encodes a payload length as the 4-byte big-endian length field.
pub fn encode_length(len: usize) -> Result<[u8; LENGTH_SIZE], ProtocolError> {
    let len = u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
        size: len as u64,
        max: u32::MAX as u64,
    })?;
    Ok(len.to_be_bytes())
}

/// Decodes the 4-byte big-endian length field.
pub fn decode_length(buf: [u8; LENGTH_SIZE]) -> u32 {
    u32::from_be_bytes(buf)
}

fn check_declared(len: u32, max: u32) -> Result<usize, ProtocolError> {
    if len > max {
        return Err(ProtocolError::FrameTooLarge {
            size: len as u64,
            max: max as u64,
        });
    }
    Ok(len as usize)
}

/// A request frame sent from the gateway to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Request payload (JSON text).
    pub payload: Bytes,
}

impl RequestFrame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let len = encode_length(self.payload.len())?;
        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE + self.payload.len());
        buf.put_slice(&PREAMBLE);
        buf.put_slice(&len);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a request frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut, max_payload: u32) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < PREAMBLE_SIZE {
            return Ok(None);
        }

        let preamble = [buf[0], buf[1], buf[2], buf[3]];
        if preamble != PREAMBLE {
            return Err(ProtocolError::InvalidPreamble(preamble));
        }

        if buf.len() < REQUEST_HEADER_SIZE {
            return Ok(None);
        }

        let declared = decode_length([buf[4], buf[5], buf[6], buf[7]]);
        let payload_len = check_declared(declared, max_payload)?;
        if buf.len() < REQUEST_HEADER_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(REQUEST_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();
        Ok(Some(Self { payload }))
    }
}

/// A response frame sent from the node back to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Response payload (JSON text).
    pub payload: Bytes,
}

impl ResponseFrame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let len = encode_length(self.payload.len())?;
        let mut buf = BytesMut::with_capacity(LENGTH_SIZE + self.payload.len());
        buf.put_slice(&len);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a response frame from bytes.
    ///
    /// Same contract as [`RequestFrame::decode`].
    pub fn decode(buf: &mut BytesMut, max_payload: u32) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < LENGTH_SIZE {
            return Ok(None);
        }

        let declared = decode_length([buf[0], buf[1], buf[2], buf[3]]);
        let payload_len = check_declared(declared, max_payload)?;
        if buf.len() < LENGTH_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(LENGTH_SIZE);
        let payload = buf.split_to(payload_len).freeze();
        Ok(Some(Self { payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_MAX_PAYLOAD_SIZE;
    use proptest::prelude::*;

    #[test]
    fn test_request_layout() {
        let frame = RequestFrame::new(&b"{\"a\":1}"[..]);
        let encoded = frame.encode().unwrap();

        assert_eq!(&encoded[..4], b"N\x01\x00\x00");
        assert_eq!(&encoded[4..8], &[0, 0, 0, 7]);
        assert_eq!(&encoded[8..], b"{\"a\":1}");
    }

    #[test]
    fn test_response_layout() {
        let frame = ResponseFrame::new(&b"{}"[..]);
        let encoded = frame.encode().unwrap();
        assert_eq!(&encoded[..], b"\x00\x00\x00\x02{}");
    }

    #[test]
    fn test_length_is_big_endian() {
        assert_eq!(encode_length(0x0102_0304).unwrap(), [1, 2, 3, 4]);
        assert_eq!(decode_length([0, 0, 1, 0]), 256);
    }

    #[test]
    fn test_empty_payload() {
        let frame = RequestFrame::new(Bytes::new());
        let mut buf = frame.encode().unwrap();
        assert_eq!(buf.len(), REQUEST_HEADER_SIZE);

        let decoded = RequestFrame::decode(&mut buf, DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap()
            .unwrap();
        assert!(decoded.payload.is_empty());
        assert!(buf.is_empty());

        let mut buf = BytesMut::from(&b"\x00\x00\x00\x00"[..]);
        let decoded = ResponseFrame::decode(&mut buf, DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap()
            .unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_incomplete_frame() {
        let mut buf = BytesMut::from(&b"N\x01"[..]);
        assert!(RequestFrame::decode(&mut buf, DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap()
            .is_none());

        // Header complete, payload short by one byte
        let mut buf = BytesMut::from(&b"\x00\x00\x00\x05abcd"[..]);
        assert!(ResponseFrame::decode(&mut buf, DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_invalid_preamble() {
        let mut buf = BytesMut::from(&b"N\x02\x00\x00\x00\x00\x00\x00"[..]);
        let result = RequestFrame::decode(&mut buf, DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidPreamble([b'N', 2, 0, 0]))
        ));
    }

    #[test]
    fn test_declared_length_over_max() {
        let mut buf = BytesMut::from(&b"\x00\x00\x01\x00"[..]);
        let result = ResponseFrame::decode(&mut buf, 255);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 256, max: 255 })
        ));
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&RequestFrame::new(&b"one"[..]).encode().unwrap());
        buf.extend_from_slice(&RequestFrame::new(&b"two"[..]).encode().unwrap());

        let first = RequestFrame::decode(&mut buf, DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap()
            .unwrap();
        let second = RequestFrame::decode(&mut buf, DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(first.payload.as_ref(), b"one");
        assert_eq!(second.payload.as_ref(), b"two");
        assert!(buf.is_empty());
    }

    proptest! {
        #[test]
        fn prop_request_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let mut buf = RequestFrame::new(payload.clone()).encode().unwrap();
            let declared = decode_length([buf[4], buf[5], buf[6], buf[7]]);
            prop_assert_eq!(declared as usize, payload.len());

            let decoded = RequestFrame::decode(&mut buf, DEFAULT_MAX_PAYLOAD_SIZE).unwrap().unwrap();
            prop_assert_eq!(decoded.payload.as_ref(), payload.as_slice());
        }
    }
}
