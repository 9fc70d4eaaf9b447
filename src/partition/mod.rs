//! Partition state persistence
//!
//! Each shard keeps one small JSON record per owned partition describing its
//! lifecycle state, checkpoint, sequencing window, CAS high-water mark,
//! drift counter and failover history, so the engine can recover them after
//! a restart.
//!
//! # Invariants
//!
//! - A never-written partition reads back as the default (dead) state
//! - `checkpoint_id` and `max_deleted_seqno` never decrease across commits
//! - The failover history is never empty
//! - A record that exists but is not JSON is surfaced as corruption, never
//!   silently replaced by defaults

mod errors;
mod state;
mod store;

pub use errors::{StateError, StateResult};
pub use state::{DecodedState, FailoverEntry, LifecycleState, PartitionState, INITIAL_DRIFT};
pub use store::{state_key, PartitionStateStore, STATE_KVS_NAME};
