//! Partition state errors
//!
//! - SHARD_STATE_OPEN_FAILED (ERROR): the `vbstate` sub-store could not be opened
//! - SHARD_STATE_WRITE_FAILED (ERROR): upsert of a record failed, not retried
//! - SHARD_STATE_CORRUPT (FATAL): a record exists but is not JSON

use thiserror::Error;

use crate::engine::EngineError;

/// Result type for partition state operations
pub type StateResult<T> = Result<T, StateError>;

/// Partition state errors
#[derive(Debug, Clone, Error)]
pub enum StateError {
    #[error("failed to open partition state sub-store: {0}")]
    Open(#[source] EngineError),

    #[error("failed to persist state for partition {partition}: {source}")]
    WriteFailed {
        partition: u16,
        #[source]
        source: EngineError,
    },

    #[error("state record for partition {partition} is not valid JSON: {reason}")]
    Corrupt { partition: u16, reason: String },
}

impl StateError {
    /// Error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Open(_) => "SHARD_STATE_OPEN_FAILED",
            Self::WriteFailed { .. } => "SHARD_STATE_WRITE_FAILED",
            Self::Corrupt { .. } => "SHARD_STATE_CORRUPT",
        }
    }

    /// Whether the shard cannot be trusted after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_corruption_is_fatal() {
        let corrupt = StateError::Corrupt {
            partition: 2,
            reason: "EOF".into(),
        };
        assert!(corrupt.is_fatal());
        assert_eq!(corrupt.code(), "SHARD_STATE_CORRUPT");
        assert!(corrupt.to_string().contains("partition 2"));

        let write = StateError::WriteFailed {
            partition: 2,
            source: EngineError::WriteFailed("disk".into()),
        };
        assert!(!write.is_fatal());
    }
}
