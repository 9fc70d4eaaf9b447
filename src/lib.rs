//! shardstore - partitioned key-value storage adapter
//!
//! Maps a store/retrieve/delete/commit contract onto an embedded ordered
//! key-value engine, adding per-partition state persistence, a fixed-layout
//! metadata envelope on every document and batched durable commits with
//! per-mutation callbacks.

pub mod cli;
pub mod engine;
pub mod envelope;
pub mod handles;
pub mod mutation;
pub mod observability;
pub mod partition;
pub mod store;

pub use envelope::Document;
pub use store::{KvStoreFactory, ShardStore, StoreConfig, StoreError, StoreResult};
