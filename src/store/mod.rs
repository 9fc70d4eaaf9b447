//! Storage adapter for one shard
//!
//! Composes the engine file, the partition state store, the handle registry
//! and the mutation queue behind the contract the partitioned engine
//! uses: transactional set/delete with completion callbacks, single and
//! multi-key lookup, partition state snapshots, rollback and compaction.
//!
//! # Invariants
//!
//! - A shard owns partitions `p` with `p mod max_shards == shard_id`
//! - Every accepted mutation's callback fires exactly once
//! - Callbacks of a batch fire in submission order after its durability
//!   commit, whether or not that commit succeeded
//! - The data file is the highest existing revision, `<shard>.fdb.<rev>`

mod config;
mod errors;
mod factory;
mod files;
mod shard;
mod types;

pub use config::StoreConfig;
pub use errors::{Severity, StoreError, StoreResult};
pub use factory::{Backend, KvStoreFactory};
pub use files::{discover_revision, file_prefix, shard_file_path, INITIAL_REVISION};
pub use shard::{ShardStore, STATS_FILE_NAME};
pub use types::{
    CompactionConfig, CompactionStats, FetchQueue, FetchRequest, GetStatus, GetValue,
    RollbackResult, StorageProperties, StoredItem,
};
