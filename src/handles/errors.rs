//! Handle registry errors

use thiserror::Error;

use crate::engine::EngineError;

/// Result type for handle lookups
pub type HandleResult<T> = Result<T, HandleError>;

#[derive(Debug, Clone, Error)]
pub enum HandleError {
    /// The partition is not owned by this shard
    #[error("partition {0} is not owned by this shard")]
    PartitionNotOwned(u16),

    /// The partition's sub-store could not be opened
    #[error("failed to open sub-store for partition {partition}: {source}")]
    OpenFailure {
        partition: u16,
        #[source]
        source: EngineError,
    },

    #[error("handle registry lock poisoned")]
    LockPoisoned,
}

impl HandleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PartitionNotOwned(_) => "SHARD_PARTITION_NOT_OWNED",
            Self::OpenFailure { .. } => "SHARD_OPEN_FAILURE",
            Self::LockPoisoned => "SHARD_LOCK_POISONED",
        }
    }

    /// Caller bugs, as opposed to runtime failures
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::PartitionNotOwned(_))
    }
}
