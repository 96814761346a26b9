//! # nanogate-protocol
//!
//! Wire protocol for the node IPC link.
//!
//! This crate provides:
//! - Request framing: 4-byte preamble, big-endian length, payload
//! - Response framing: big-endian length, payload
//! - A buffering decoder for the receiving side of either direction
//!
//! The crate performs no I/O. Sessions write and read the individual frame
//! parts themselves so every part gets its own deadline.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::Decoder;
pub use error::ProtocolError;
pub use frame::{
    decode_length, encode_length, RequestFrame, ResponseFrame, LENGTH_SIZE, PREAMBLE,
    PREAMBLE_SIZE, REQUEST_HEADER_SIZE,
};

/// Lead byte of the request preamble.
pub const PREAMBLE_LEAD: u8 = b'N';

/// Payload encoding announced in the request preamble (JSON over the legacy IPC framing).
pub const ENCODING_VERSION: u8 = 1;

/// Value of the two reserved preamble bytes.
pub const PREAMBLE_RESERVED: u8 = 0;

/// Default upper bound for a declared payload length (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;
