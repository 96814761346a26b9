//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid preamble: expected [0x4e, 0x01, 0x00, 0x00], got {0:02x?}")]
    InvalidPreamble([u8; 4]),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
