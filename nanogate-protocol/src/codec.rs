//! Buffering decoder for frames arriving in arbitrary chunks.

use crate::error::ProtocolError;
use crate::frame::{RequestFrame, ResponseFrame};
use crate::DEFAULT_MAX_PAYLOAD_SIZE;
use bytes::{Bytes, BytesMut};

/// Accumulates bytes from a socket and yields complete frames.
pub struct Decoder {
    buffer: BytesMut,
    max_payload: u32,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload(max_payload: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_payload,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next request payload from the buffer.
    pub fn decode_request(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        Ok(RequestFrame::decode(&mut self.buffer, self.max_payload)?.map(|f| f.payload))
    }

    /// Attempts to decode the next response payload from the buffer.
    pub fn decode_response(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        Ok(ResponseFrame::decode(&mut self.buffer, self.max_payload)?.map(|f| f.payload))
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
