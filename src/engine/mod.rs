//! Boundary to the embedded storage library
//!
//! The adapter only needs an ordered key-value engine that keeps several
//! named sub-stores ("KV stores") inside one file:
//!
//! - `open(path)` → file
//! - `open_kvs(file, name)` → sub-store handle
//! - `get` / `set` / `delete` on a handle
//! - `commit(file)` makes every write issued since the last commit durable
//!
//! Writes become visible to reads on the same file immediately; they are
//! only crash-durable after `commit`. Closing a file discards uncommitted
//! writes.
//!
//! Two implementations ship with the crate: [`RedbEngine`] (on-disk, backed
//! by redb) and [`MemoryEngine`] (in-process, with fault injection).

mod errors;
mod memory;
mod redb_engine;

use std::path::Path;
use std::sync::Arc;

pub use self::errors::{EngineError, EngineResult};
pub use self::memory::MemoryEngine;
pub use self::redb_engine::RedbEngine;

/// One entry of a sub-store as the engine returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDoc {
    pub key: Vec<u8>,
    /// Opaque metadata (the adapter's envelope)
    pub meta: Vec<u8>,
    /// Document body, empty for tombstones
    pub body: Vec<u8>,
    /// Whether this entry is a tombstone
    pub deleted: bool,
}

/// Options used when opening an engine file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    /// Create the file if it does not exist
    pub create_if_missing: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
        }
    }
}

/// Options used when opening a sub-store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvsConfig {
    /// Create the sub-store if it does not exist
    pub create_if_missing: bool,
}

impl Default for KvsConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
        }
    }
}

/// An embedded storage library.
pub trait StorageEngine: Send + Sync {
    /// Short backend name, used in logs
    fn name(&self) -> &'static str;

    /// Open (or create) the file at `path`.
    fn open(&self, path: &Path, config: &FileConfig) -> EngineResult<Box<dyn EngineFile>>;
}

/// An open engine file holding named sub-stores.
pub trait EngineFile: Send + Sync {
    fn path(&self) -> &Path;

    /// Open the named sub-store.
    fn open_kvs(&self, name: &str, config: &KvsConfig) -> EngineResult<Arc<dyn KvsHandle>>;

    /// Make every write issued since the previous commit durable.
    fn commit(&self) -> EngineResult<()>;

    /// Close the file. Uncommitted writes are discarded and every handle
    /// opened from this file stops working.
    fn close(&self) -> EngineResult<()>;
}

/// An open sub-store.
pub trait KvsHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Point lookup. Tombstones are returned with `deleted` set.
    fn get(&self, key: &[u8]) -> EngineResult<Option<StoredDoc>>;

    /// Upsert a live document.
    fn set(&self, key: &[u8], meta: &[u8], body: &[u8]) -> EngineResult<()>;

    /// Replace a live document with a tombstone carrying `meta`.
    ///
    /// Returns [`EngineError::KeyNotFound`] if there is no live document.
    fn delete(&self, key: &[u8], meta: &[u8]) -> EngineResult<()>;

    /// Every entry, tombstones included, in key order.
    fn scan(&self) -> EngineResult<Vec<StoredDoc>>;

    /// Remove an entry outright (live or tombstone). Returns whether
    /// anything was removed.
    fn purge(&self, key: &[u8]) -> EngineResult<bool>;
}
