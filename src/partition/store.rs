//! Persistence of partition state records
//!
//! One record per partition in the `vbstate` sub-store, keyed
//! `"partition<id>"`. Reads never fail for a missing or unreadable record:
//! the partition simply has never been initialized. A record that exists
//! but is not JSON is corruption and is reported to the caller.

use std::sync::Arc;

use super::errors::{StateError, StateResult};
use super::state::{DecodedState, PartitionState};
use crate::engine::{EngineFile, KvsConfig, KvsHandle};
use crate::observability::{Event, Logger};

/// Name of the sub-store holding partition records
pub const STATE_KVS_NAME: &str = "vbstate";

/// Key of a partition's record in the state sub-store
pub fn state_key(partition: u16) -> String {
    format!("partition{}", partition)
}

/// Reads and writes partition state records.
pub struct PartitionStateStore {
    kvs: Arc<dyn KvsHandle>,
    logger: Logger,
}

impl PartitionStateStore {
    /// Open the state sub-store inside `file`.
    pub fn open(file: &dyn EngineFile, logger: Logger) -> StateResult<Self> {
        let kvs = file
            .open_kvs(STATE_KVS_NAME, &KvsConfig::default())
            .map_err(StateError::Open)?;
        Ok(Self { kvs, logger })
    }

    /// Load the record for `partition`, defaulting when absent.
    pub fn read_state(&self, partition: u16) -> StateResult<PartitionState> {
        let key = state_key(partition);
        let partition_str = partition.to_string();

        let doc = match self.kvs.get(key.as_bytes()) {
            Ok(Some(doc)) if !doc.deleted => doc,
            Ok(_) => {
                self.logger.trace(
                    Event::StateLoadFailed,
                    &[("partition", &partition_str), ("reason", "absent")],
                );
                return Ok(PartitionState::default());
            }
            Err(e) => {
                self.logger.trace(
                    Event::StateLoadFailed,
                    &[("partition", &partition_str), ("reason", &e.to_string())],
                );
                return Ok(PartitionState::default());
            }
        };

        match PartitionState::decode(&doc.body) {
            Ok(DecodedState::Parsed(state)) => Ok(state),
            Ok(DecodedState::Malformed(reason)) => {
                let body = String::from_utf8_lossy(&doc.body);
                self.logger.warn(
                    Event::StateMalformed,
                    &[
                        ("body", &body),
                        ("partition", &partition_str),
                        ("reason", &reason),
                    ],
                );
                Ok(PartitionState::default())
            }
            Err(reason) => {
                let body = String::from_utf8_lossy(&doc.body);
                self.logger.fatal(
                    Event::StateCorrupt,
                    &[
                        ("body", &body),
                        ("partition", &partition_str),
                        ("reason", &reason),
                    ],
                );
                Err(StateError::Corrupt { partition, reason })
            }
        }
    }

    /// Upsert the record for `partition`. Not retried on failure.
    pub fn write_state(&self, partition: u16, state: &PartitionState) -> StateResult<()> {
        let key = state_key(partition);
        let body = state.to_json();

        self.kvs
            .set(key.as_bytes(), &[], body.as_bytes())
            .map_err(|source| {
                self.logger.error(
                    Event::StatePersistFailed,
                    &[
                        ("error", &source.to_string()),
                        ("partition", &partition.to_string()),
                    ],
                );
                StateError::WriteFailed { partition, source }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FileConfig, MemoryEngine, StorageEngine};
    use crate::observability::{MemorySink, Severity};
    use crate::partition::state::{FailoverEntry, LifecycleState};
    use std::path::Path;

    fn open_store(engine: &MemoryEngine, sink: Arc<MemorySink>) -> (Box<dyn EngineFile>, PartitionStateStore) {
        let file = engine
            .open(Path::new("/mem/0.fdb.1"), &FileConfig::default())
            .unwrap();
        let store = PartitionStateStore::open(file.as_ref(), Logger::new(sink)).unwrap();
        (file, store)
    }

    #[test]
    fn test_state_key_format() {
        assert_eq!(state_key(0), "partition0");
        assert_eq!(state_key(1023), "partition1023");
    }

    #[test]
    fn test_absent_record_defaults() {
        let sink = Arc::new(MemorySink::new());
        let (_file, store) = open_store(&MemoryEngine::new(), sink.clone());

        assert_eq!(store.read_state(4).unwrap(), PartitionState::default());
        let records = sink.records_for(Event::StateLoadFailed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Trace);
    }

    #[test]
    fn test_write_then_read() {
        let (_file, store) = open_store(&MemoryEngine::new(), Arc::new(MemorySink::new()));
        let state = PartitionState {
            state: LifecycleState::Active,
            checkpoint_id: 7,
            max_deleted_seqno: 3,
            snap_start: 1,
            snap_end: 9,
            max_cas: 99,
            drift_counter: 0,
            failover_history: vec![FailoverEntry { id: 5, seq: 0 }],
        };

        store.write_state(2, &state).unwrap();
        assert_eq!(store.read_state(2).unwrap(), state);
    }

    #[test]
    fn test_malformed_record_warns_and_defaults() {
        let sink = Arc::new(MemorySink::new());
        let (file, store) = open_store(&MemoryEngine::new(), sink.clone());
        let kvs = file.open_kvs(STATE_KVS_NAME, &KvsConfig::default()).unwrap();
        kvs.set(b"partition0", &[], br#"{"state":"active"}"#).unwrap();

        assert_eq!(store.read_state(0).unwrap(), PartitionState::default());
        let warnings = sink.records_for(Event::StateMalformed);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warn);
        assert_eq!(warnings[0].field("partition"), Some("0"));
    }

    #[test]
    fn test_invalid_json_is_corrupt() {
        let sink = Arc::new(MemorySink::new());
        let (file, store) = open_store(&MemoryEngine::new(), sink.clone());
        let kvs = file.open_kvs(STATE_KVS_NAME, &KvsConfig::default()).unwrap();
        kvs.set(b"partition0", &[], b"not json").unwrap();

        let err = store.read_state(0).unwrap_err();
        assert!(matches!(err, StateError::Corrupt { partition: 0, .. }));
        assert!(sink.contains(Event::StateCorrupt));
    }
}
