//! Mutation queue errors

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A mutation was submitted without `begin_transaction`
    #[error("mutation submitted outside a transaction")]
    NotInTransaction,

    /// A mutation was submitted while the batch was being flushed
    #[error("mutation submitted while a commit is in progress")]
    Flushing,
}

impl QueueError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInTransaction => "SHARD_NOT_IN_TRANSACTION",
            Self::Flushing => "SHARD_COMMIT_IN_PROGRESS",
        }
    }
}
