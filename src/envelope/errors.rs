//! Envelope decode errors
//!
//! Encoding cannot fail at runtime; oversized extended metadata is a
//! caller bug and panics. Decoding reads bytes that came back from disk,
//! so every mismatch is reported as corruption.

use thiserror::Error;

/// Result type for envelope decoding
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Envelope decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("envelope length {actual} does not match fixed size {expected}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown envelope format marker 0x{0:02x}")]
    UnknownFormat(u8),

    #[error("unknown conflict resolution mode {0}")]
    UnknownConflictMode(u8),
}

impl EnvelopeError {
    /// Error code string
    pub fn code(&self) -> &'static str {
        "SHARD_ENVELOPE_CORRUPT"
    }
}
