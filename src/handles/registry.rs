use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::errors::{HandleError, HandleResult};
use crate::engine::{EngineFile, KvsConfig, KvsHandle};
use crate::observability::{Event, Logger};

type Pool = HashMap<u16, Option<Arc<dyn KvsHandle>>>;

/// Name of the document sub-store for `partition`
pub fn partition_kvs_name(partition: u16) -> String {
    format!("partition{}", partition)
}

#[derive(Default)]
struct Pools {
    write: Pool,
    read: Pool,
}

#[derive(Clone, Copy)]
enum PoolKind {
    Write,
    Read,
}

impl PoolKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
        }
    }
}

/// Lazily opened sub-store handles for the partitions a shard owns.
///
/// Every owned partition starts with an unopened slot in both pools. A slot
/// is filled on first access and reused afterwards. A failed open leaves
/// the slot empty so the next access tries again.
pub struct HandleRegistry {
    file: Arc<dyn EngineFile>,
    pools: Mutex<Pools>,
    logger: Logger,
}

impl HandleRegistry {
    pub fn new(file: Arc<dyn EngineFile>, owned: &[u16], logger: Logger) -> Self {
        let mut pools = Pools::default();
        for &partition in owned {
            pools.write.insert(partition, None);
            pools.read.insert(partition, None);
        }
        Self {
            file,
            pools: Mutex::new(pools),
            logger,
        }
    }

    /// Handle used for sets and deletes.
    pub fn get_write_handle(&self, partition: u16) -> HandleResult<Arc<dyn KvsHandle>> {
        self.get_handle(partition, PoolKind::Write)
    }

    /// Handle used for lookups.
    pub fn get_read_handle(&self, partition: u16) -> HandleResult<Arc<dyn KvsHandle>> {
        self.get_handle(partition, PoolKind::Read)
    }

    pub fn is_owned(&self, partition: u16) -> bool {
        self.pools
            .lock()
            .map(|pools| pools.write.contains_key(&partition))
            .unwrap_or(false)
    }

    /// Owned partitions in ascending order.
    pub fn owned_partitions(&self) -> Vec<u16> {
        let mut owned: Vec<u16> = self
            .pools
            .lock()
            .map(|pools| pools.write.keys().copied().collect())
            .unwrap_or_default();
        owned.sort_unstable();
        owned
    }

    /// Number of handles currently open across both pools.
    pub fn open_count(&self) -> usize {
        self.pools
            .lock()
            .map(|pools| {
                pools.write.values().filter(|h| h.is_some()).count()
                    + pools.read.values().filter(|h| h.is_some()).count()
            })
            .unwrap_or(0)
    }

    /// Drop every cached handle. Slots stay registered.
    pub fn close_all(&self) {
        if let Ok(mut guard) = self.pools.lock() {
            let pools = &mut *guard;
            for slot in pools.write.values_mut().chain(pools.read.values_mut()) {
                *slot = None;
            }
        }
    }

    fn get_handle(&self, partition: u16, kind: PoolKind) -> HandleResult<Arc<dyn KvsHandle>> {
        let mut pools = self.pools.lock().map_err(|_| HandleError::LockPoisoned)?;
        let pool = match kind {
            PoolKind::Write => &mut pools.write,
            PoolKind::Read => &mut pools.read,
        };

        let slot = pool
            .get_mut(&partition)
            .ok_or(HandleError::PartitionNotOwned(partition))?;

        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let name = partition_kvs_name(partition);
        match self.file.open_kvs(&name, &KvsConfig::default()) {
            Ok(handle) => {
                *slot = Some(Arc::clone(&handle));
                Ok(handle)
            }
            Err(source) => {
                self.logger.error(
                    Event::KvsOpenFailed,
                    &[
                        ("error", &source.to_string()),
                        ("kvs", &name),
                        ("pool", kind.as_str()),
                    ],
                );
                Err(HandleError::OpenFailure { partition, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FileConfig, MemoryEngine, StorageEngine};
    use crate::observability::MemorySink;
    use std::path::Path;

    fn registry(engine: &MemoryEngine, owned: &[u16], sink: Arc<MemorySink>) -> HandleRegistry {
        let file: Arc<dyn EngineFile> = Arc::from(
            engine
                .open(Path::new("/mem/0.fdb.1"), &FileConfig::default())
                .unwrap(),
        );
        HandleRegistry::new(file, owned, Logger::new(sink))
    }

    #[test]
    fn test_handles_are_cached() {
        let registry = registry(&MemoryEngine::new(), &[0, 2], Arc::new(MemorySink::new()));
        assert_eq!(registry.open_count(), 0);

        let first = registry.get_write_handle(0).unwrap();
        let second = registry.get_write_handle(0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "partition0");
        assert_eq!(registry.open_count(), 1);

        let read = registry.get_read_handle(0).unwrap();
        assert!(!Arc::ptr_eq(&first, &read));
        assert_eq!(registry.open_count(), 2);
    }

    #[test]
    fn test_unowned_partition_rejected() {
        let registry = registry(&MemoryEngine::new(), &[0, 2], Arc::new(MemorySink::new()));
        let err = registry.get_write_handle(1).err().unwrap();
        assert!(matches!(err, HandleError::PartitionNotOwned(1)));
        assert!(err.is_contract_violation());
        assert!(!registry.is_owned(1));
        assert_eq!(registry.owned_partitions(), vec![0, 2]);
    }

    #[test]
    fn test_open_failure_not_cached() {
        let engine = MemoryEngine::new();
        let sink = Arc::new(MemorySink::new());
        engine.fail_kvs_open("partition2");
        let registry = registry(&engine, &[0, 2], sink.clone());

        let err = registry.get_write_handle(2).err().unwrap();
        assert!(matches!(err, HandleError::OpenFailure { partition: 2, .. }));
        assert_eq!(registry.open_count(), 0);
        assert!(sink.contains(Event::KvsOpenFailed));

        engine.clear_faults();
        assert!(registry.get_write_handle(2).is_ok());
    }

    #[test]
    fn test_close_all_drops_handles() {
        let registry = registry(&MemoryEngine::new(), &[0, 2], Arc::new(MemorySink::new()));
        registry.get_write_handle(0).unwrap();
        registry.get_read_handle(2).unwrap();

        registry.close_all();
        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.owned_partitions(), vec![0, 2]);
    }
}
