//! Wire error types.

use thiserror::Error;

/// Errors from reading or writing framed messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The peer closed the connection before a new message started.
    #[error("connection closed")]
    Closed,

    /// The connection ended in the middle of a frame.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Bytes the frame called for.
        expected: usize,
        /// Bytes actually received before end of stream.
        got: usize,
    },

    /// The payload does not fit in the 32-bit length prefix.
    #[error("message of {0} bytes exceeds the length prefix")]
    TooLarge(usize),

    /// The payload was expected to be text but is not valid UTF-8.
    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    /// Underlying stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether the error means the connection can no longer be used.
    ///
    /// Only a non-UTF-8 payload leaves the stream aligned on a frame boundary.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WireError::InvalidUtf8)
    }
}
