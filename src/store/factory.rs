//! Backend selection by name

use std::sync::Arc;

use super::config::StoreConfig;
use super::errors::{StoreError, StoreResult};
use super::ShardStore;
use crate::engine::{MemoryEngine, RedbEngine, StorageEngine};
use crate::observability::Logger;

/// Storage backends the adapter can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// On-disk redb files
    Redb,
    /// In-process, nothing survives the process
    Memory,
}

impl Backend {
    pub fn parse(name: &str) -> StoreResult<Self> {
        match name {
            "redb" => Ok(Self::Redb),
            "memory" => Ok(Self::Memory),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Memory => "memory",
        }
    }

    /// A fresh engine instance for this backend.
    pub fn engine(&self) -> Arc<dyn StorageEngine> {
        match self {
            Self::Redb => Arc::new(RedbEngine::new()),
            Self::Memory => Arc::new(MemoryEngine::new()),
        }
    }
}

/// Creates shard stores from configuration.
pub struct KvStoreFactory;

impl KvStoreFactory {
    /// Open the shard described by `config` on its configured backend.
    pub fn create(config: StoreConfig, logger: Logger) -> StoreResult<ShardStore> {
        let backend = Backend::parse(&config.backend)?;
        ShardStore::open_with_engine(config, backend.engine(), logger)
    }
}
