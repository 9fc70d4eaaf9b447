//! Observable events for shardstore
//!
//! Events are explicit and typed. Every log line the adapter produces
//! names one of these.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Lifecycle
    /// Shard file and state sub-store opened
    StoreOpen,
    /// Shard closed
    StoreClose,

    // Partition state
    /// Point lookup of a partition record failed or found nothing
    StateLoadFailed,
    /// Persisted record is valid JSON but lacks mandatory fields
    StateMalformed,
    /// Persisted record is not valid JSON
    StateCorrupt,
    /// Writing a partition record failed
    StatePersistFailed,

    // Handles
    /// Opening a partition sub-store failed
    KvsOpenFailed,

    // Mutations
    /// Engine set returned an error
    SetFailed,
    /// Engine delete returned an error
    DeleteFailed,
    /// Durability commit failed
    CommitFailed,
    /// Batch delivered
    CommitComplete,

    // Reads
    /// Single-key fetch failed
    GetFailed,

    // Maintenance
    /// Tombstone purge finished
    CompactionComplete,
    /// Tombstone with unreadable metadata left in place
    CompactionSkipped,
    /// Rollback requested
    Rollback,
    /// Partition documents and state were reset
    PartitionReset,
}

impl Event {
    /// Returns the event name as emitted in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpen => "STORE_OPEN",
            Event::StoreClose => "STORE_CLOSE",
            Event::StateLoadFailed => "STATE_LOAD_FAILED",
            Event::StateMalformed => "STATE_MALFORMED",
            Event::StateCorrupt => "STATE_CORRUPT",
            Event::StatePersistFailed => "STATE_PERSIST_FAILED",
            Event::KvsOpenFailed => "KVS_OPEN_FAILED",
            Event::SetFailed => "SET_FAILED",
            Event::DeleteFailed => "DELETE_FAILED",
            Event::CommitFailed => "COMMIT_FAILED",
            Event::CommitComplete => "COMMIT_COMPLETE",
            Event::GetFailed => "GET_FAILED",
            Event::CompactionComplete => "COMPACTION_COMPLETE",
            Event::CompactionSkipped => "COMPACTION_SKIPPED",
            Event::Rollback => "ROLLBACK",
            Event::PartitionReset => "PARTITION_RESET",
        }
    }

    /// Whether this event means the shard cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::StateCorrupt)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
