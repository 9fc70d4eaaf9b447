//! Storage engine error types
//!
//! These mirror the status codes an embedded engine reports. The mutation
//! layer folds them into per-request outcomes (see
//! [`crate::mutation::MutationStatus::from_engine`]).

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by the underlying storage engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("key not found")]
    KeyNotFound,

    #[error("no such file: {0}")]
    NoSuchFile(String),

    #[error("no database headers in {0}")]
    NoDbHeaders(String),

    #[error("failed to open {target}: {message}")]
    OpenFailed { target: String, message: String },

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("corrupt record in {kvs}: {reason}")]
    CorruptRecord { kvs: String, reason: String },

    #[error("engine file is closed")]
    Closed,

    #[error("engine lock poisoned")]
    LockPoisoned,
}

impl EngineError {
    pub fn open_failed(target: impl Into<String>, message: impl ToString) -> Self {
        Self::OpenFailed {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeyNotFound => "SHARD_ENGINE_KEY_NOT_FOUND",
            Self::NoSuchFile(_) => "SHARD_ENGINE_NO_SUCH_FILE",
            Self::NoDbHeaders(_) => "SHARD_ENGINE_NO_DB_HEADERS",
            Self::OpenFailed { .. } => "SHARD_ENGINE_OPEN_FAILED",
            Self::ReadFailed(_) => "SHARD_ENGINE_READ_FAILED",
            Self::WriteFailed(_) => "SHARD_ENGINE_WRITE_FAILED",
            Self::CommitFailed(_) => "SHARD_ENGINE_COMMIT_FAILED",
            Self::CorruptRecord { .. } => "SHARD_ENGINE_CORRUPT_RECORD",
            Self::Closed => "SHARD_ENGINE_CLOSED",
            Self::LockPoisoned => "SHARD_ENGINE_LOCK_POISONED",
        }
    }

    /// Whether the error means "nothing stored under this key/file".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound | Self::NoSuchFile(_) | Self::NoDbHeaders(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_family() {
        assert!(EngineError::KeyNotFound.is_not_found());
        assert!(EngineError::NoSuchFile("x".into()).is_not_found());
        assert!(EngineError::NoDbHeaders("x".into()).is_not_found());
        assert!(!EngineError::WriteFailed("x".into()).is_not_found());
        assert!(!EngineError::Closed.is_not_found());
    }

    #[test]
    fn test_open_failed_display() {
        let err = EngineError::open_failed("partition3", "table missing");
        assert_eq!(err.to_string(), "failed to open partition3: table missing");
        assert_eq!(err.code(), "SHARD_ENGINE_OPEN_FAILED");
    }
}
