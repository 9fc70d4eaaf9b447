//! Adapter error types
//!
//! Error codes:
//! - SHARD_INVALID_CONFIG (FATAL)
//! - SHARD_UNKNOWN_BACKEND (FATAL)
//! - SHARD_NOT_IN_TRANSACTION (FATAL)
//! - SHARD_PARTITION_NOT_OWNED (FATAL)
//! - SHARD_READ_ONLY (FATAL)
//! - SHARD_INVALID_REVISION (ERROR)
//! - SHARD_OPEN_FAILURE (ERROR)
//! - SHARD_STATE_CORRUPT (FATAL)
//! - SHARD_IO_ERROR (ERROR)
//!
//! Contract violations (bugs in the caller) and corrupt state are FATAL;
//! everything else fails the operation and leaves the shard usable.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::engine::EngineError;
use crate::envelope::EnvelopeError;
use crate::handles::HandleError;
use crate::mutation::QueueError;
use crate::partition::StateError;

/// Severity of an adapter error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, shard continues
    Error,
    /// Shard must not continue
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Result type for adapter operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Adapter errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown storage backend '{0}'")]
    UnknownBackend(String),

    #[error("data file '{file}' has a non-numeric revision")]
    InvalidRevision { file: String },

    #[error("failed to open data file: {0}")]
    OpenFailure(#[source] EngineError),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("engine error: {0}")]
    Engine(#[source] EngineError),

    #[error("mutation rejected: store is read-only")]
    ReadOnly,

    #[error("store is closed")]
    Closed,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "SHARD_INVALID_CONFIG",
            Self::UnknownBackend(_) => "SHARD_UNKNOWN_BACKEND",
            Self::InvalidRevision { .. } => "SHARD_INVALID_REVISION",
            Self::OpenFailure(_) => "SHARD_OPEN_FAILURE",
            Self::Handle(e) => e.code(),
            Self::State(e) => e.code(),
            Self::Queue(e) => e.code(),
            Self::Envelope(e) => e.code(),
            Self::Engine(e) => e.code(),
            Self::ReadOnly => "SHARD_READ_ONLY",
            Self::Closed => "SHARD_CLOSED",
            Self::Io { .. } => "SHARD_IO_ERROR",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::InvalidConfig(_)
            | Self::UnknownBackend(_)
            | Self::ReadOnly
            | Self::Queue(_)
            | Self::Handle(HandleError::PartitionNotOwned(_)) => Severity::Fatal,
            Self::State(e) if e.is_fatal() => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
