//! Shard configuration
//!
//! Loaded from a JSON file:
//!
//! ```json
//! { "db_name": "/var/lib/kv/data", "backend": "redb",
//!   "shard_id": 0, "max_shards": 4, "max_partitions": 1024 }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};
use super::factory::Backend;

/// Configuration of one shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data directory (required)
    pub db_name: String,

    /// Storage backend name (optional, default "redb")
    #[serde(default = "default_backend")]
    pub backend: String,

    /// This shard's index (optional, default 0)
    #[serde(default)]
    pub shard_id: u16,

    /// Number of shards the partitions are split across (optional, default 4)
    #[serde(default = "default_max_shards")]
    pub max_shards: u16,

    /// Total number of partitions (optional, default 1024)
    #[serde(default = "default_max_partitions")]
    pub max_partitions: u16,

    /// Reject every mutation (optional, default false)
    #[serde(default)]
    pub read_only: bool,
}

fn default_backend() -> String {
    "redb".to_string()
}
fn default_max_shards() -> u16 {
    4
}
fn default_max_partitions() -> u16 {
    1024
}

impl StoreConfig {
    /// Configuration with every optional field defaulted.
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            backend: default_backend(),
            shard_id: 0,
            max_shards: default_max_shards(),
            max_partitions: default_max_partitions(),
            read_only: false,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_shard(mut self, shard_id: u16, max_shards: u16) -> Self {
        self.shard_id = shard_id;
        self.max_shards = max_shards;
        self
    }

    pub fn with_max_partitions(mut self, max_partitions: u16) -> Self {
        self.max_partitions = max_partitions;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Load and validate configuration from a JSON file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: StoreConfig = serde_json::from_str(&content)
            .map_err(|e| StoreError::InvalidConfig(format!("invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.db_name.is_empty() {
            return Err(StoreError::InvalidConfig("db_name must not be empty".into()));
        }
        if self.max_shards == 0 {
            return Err(StoreError::InvalidConfig("max_shards must be > 0".into()));
        }
        if self.shard_id >= self.max_shards {
            return Err(StoreError::InvalidConfig(format!(
                "shard_id {} out of range for {} shards",
                self.shard_id, self.max_shards
            )));
        }
        if self.max_partitions == 0 {
            return Err(StoreError::InvalidConfig("max_partitions must be > 0".into()));
        }
        Backend::parse(&self.backend)?;
        Ok(())
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.db_name)
    }

    /// Partitions `p` with `p mod max_shards == shard_id`, ascending.
    pub fn owned_partitions(&self) -> Vec<u16> {
        if self.max_shards == 0 {
            return Vec::new();
        }
        (0..self.max_partitions)
            .filter(|p| p % self.max_shards == self.shard_id)
            .collect()
    }
}
