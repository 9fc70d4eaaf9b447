use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::StoreConfig;
use super::errors::{StoreError, StoreResult};
use super::files::{discover_revision, ensure_data_dir, shard_file_path};
use super::types::{
    CompactionConfig, CompactionStats, FetchQueue, GetValue, RollbackResult, StorageProperties,
    StoredItem,
};
use crate::engine::{EngineError, EngineFile, FileConfig, KvsHandle, StorageEngine};
use crate::envelope::{self, Document};
use crate::handles::{HandleError, HandleRegistry};
use crate::mutation::{DeleteCallback, MutationQueue, MutationRequest, MutationStatus, SetCallback};
use crate::observability::{Event, Logger, MetricsSnapshot, StoreMetrics};
use crate::partition::{PartitionState, PartitionStateStore};

/// Name of the engine statistics file in the data directory
pub const STATS_FILE_NAME: &str = "stats.json";

/// Storage adapter for one shard.
///
/// Owns the shard's data file, the cached state of every owned partition,
/// the partition handle registry and the pending mutation batch.
pub struct ShardStore {
    config: StoreConfig,
    engine_name: &'static str,
    file: Arc<dyn EngineFile>,
    revision: u64,
    state_store: PartitionStateStore,
    registry: HandleRegistry,
    states: BTreeMap<u16, PartitionState>,
    queue: MutationQueue,
    logger: Logger,
    metrics: StoreMetrics,
    closed: bool,
}

impl ShardStore {
    /// Open the shard on its configured backend.
    pub fn open(config: StoreConfig, logger: Logger) -> StoreResult<Self> {
        super::KvStoreFactory::create(config, logger)
    }

    /// Open the shard on a caller-supplied engine.
    ///
    /// Creates the data directory, picks the highest existing file revision
    /// and loads the state of every owned partition. A corrupt state record
    /// fails the open.
    pub fn open_with_engine(
        config: StoreConfig,
        engine: Arc<dyn StorageEngine>,
        logger: Logger,
    ) -> StoreResult<Self> {
        config.validate()?;

        let dir = config.data_path().to_path_buf();
        ensure_data_dir(&dir)?;
        let revision = discover_revision(&dir, config.shard_id)?;
        let path = shard_file_path(&dir, config.shard_id, revision);

        let file_config = FileConfig {
            create_if_missing: !config.read_only,
        };
        let file: Arc<dyn EngineFile> = Arc::from(
            engine
                .open(&path, &file_config)
                .map_err(StoreError::OpenFailure)?,
        );

        let owned = config.owned_partitions();
        let (state_store, states) = match load_states(file.as_ref(), &owned, &logger) {
            Ok(loaded) => loaded,
            Err(e) => {
                let _ = file.close();
                return Err(e);
            }
        };
        let registry = HandleRegistry::new(Arc::clone(&file), &owned, logger.clone());

        logger.info(
            Event::StoreOpen,
            &[
                ("backend", engine.name()),
                ("partitions", &owned.len().to_string()),
                ("path", &path.display().to_string()),
                ("read_only", &config.read_only.to_string()),
                ("revision", &revision.to_string()),
            ],
        );

        Ok(Self {
            config,
            engine_name: engine.name(),
            file,
            revision,
            state_store,
            registry,
            states,
            queue: MutationQueue::new(),
            logger,
            metrics: StoreMetrics::new(),
            closed: false,
        })
    }

    /// Close the shard. Mutations of an uncommitted batch are completed as
    /// failed. Closing twice is a no-op.
    pub fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let aborted = self.queue.abort();
        self.registry.close_all();
        let result = self.file.close().map_err(StoreError::Engine);

        self.logger.info(
            Event::StoreClose,
            &[
                ("aborted", &aborted.to_string()),
                ("shard", &self.config.shard_id.to_string()),
            ],
        );
        result
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine_name
    }

    /// Revision of the data file in use
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn file_path(&self) -> &Path {
        self.file.path()
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn owned_partitions(&self) -> Vec<u16> {
        self.registry.owned_partitions()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Start accepting mutations.
    pub fn begin_transaction(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.queue.begin();
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.queue.is_open()
    }

    /// Store `doc` in its partition. The callback fires at the next commit.
    pub fn set(&mut self, doc: &Document, callback: SetCallback) -> StoreResult<()> {
        self.check_mutation(doc.partition)?;

        let meta = envelope::encode(doc, false);
        let mut request = MutationRequest::set(doc.partition, doc.key.clone(), doc.by_seqno, callback);
        match self.write_handle(doc.partition)? {
            Ok(handle) => request.record(handle.set(&doc.key, &meta, &doc.body)),
            Err(source) => request.record_failure(source),
        }

        self.metrics.increment_sets();
        if request.status == MutationStatus::Failed {
            self.metrics.increment_mutation_failures();
            self.log_mutation_failure(Event::SetFailed, doc, &request);
        }

        self.queue.push(request)?;
        Ok(())
    }

    /// Replace `doc`'s key with a tombstone. Deleting a key that does not
    /// exist reports not-found through the callback.
    pub fn delete(&mut self, doc: &Document, callback: DeleteCallback) -> StoreResult<()> {
        self.check_mutation(doc.partition)?;

        let meta = envelope::encode(doc, true);
        let mut request =
            MutationRequest::delete(doc.partition, doc.key.clone(), doc.by_seqno, callback);
        match self.write_handle(doc.partition)? {
            Ok(handle) => request.record(handle.delete(&doc.key, &meta)),
            Err(source) => request.record_failure(source),
        }

        self.metrics.increment_deletes();
        if request.status == MutationStatus::Failed {
            self.metrics.increment_mutation_failures();
            self.log_mutation_failure(Event::DeleteFailed, doc, &request);
        }

        self.queue.push(request)?;
        Ok(())
    }

    /// Make the batch durable and fire its callbacks in submission order.
    ///
    /// The snapshot window, CAS high-water mark and drift counter are folded
    /// into the state of every partition the batch touched and persisted in
    /// the same durability commit. The cached states change only once that
    /// commit succeeds. Returns `false` when the batch could not be made
    /// durable; callbacks have fired regardless and the transaction stays
    /// open.
    pub fn commit(
        &mut self,
        snap_start: u64,
        snap_end: u64,
        max_cas: u64,
        drift_counter: i64,
    ) -> StoreResult<bool> {
        self.ensure_open()?;

        if self.queue.is_empty() {
            self.queue.commit(self.file.as_ref());
            return Ok(true);
        }

        let mut persisted = Vec::new();
        let mut persist_error = None;
        for (partition, max_deleted) in self.queue.touched_partitions() {
            let mut state = self.states.get(&partition).cloned().unwrap_or_default();
            state.apply_snapshot(snap_start, snap_end, max_cas, drift_counter);
            state.record_deletion(max_deleted);
            if let Err(e) = self.state_store.write_state(partition, &state) {
                persist_error = Some(EngineError::WriteFailed(e.to_string()));
                break;
            }
            persisted.push((partition, state));
        }

        let report = match persist_error {
            None => self.queue.commit(self.file.as_ref()),
            Some(error) => self.queue.fail_commit(error),
        };
        if report.durable {
            self.metrics.increment_commits();
            for (partition, state) in persisted {
                self.metrics.increment_state_writes();
                self.states.insert(partition, state);
            }
            self.logger.trace(
                Event::CommitComplete,
                &[
                    ("mutations", &report.completed.to_string()),
                    ("snap_end", &snap_end.to_string()),
                    ("unsuccessful", &report.unsuccessful.to_string()),
                ],
            );
        } else {
            self.metrics.increment_commit_failures();
            let error = report
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            self.logger.error(
                Event::CommitFailed,
                &[
                    ("error", &error),
                    ("mutations", &report.completed.to_string()),
                    ("path", &self.file.path().display().to_string()),
                ],
            );
        }

        Ok(report.durable)
    }

    /// Look up `key`. Tombstones are returned only with `fetch_deleted`.
    pub fn get(&self, key: &[u8], partition: u16, fetch_deleted: bool) -> StoreResult<GetValue> {
        self.fetch(key, partition, fetch_deleted, false)
    }

    /// Fill every waiter of `queue` with the value of its key, one key at a
    /// time. A key whose waiters all want metadata only is fetched without
    /// its body (tombstones included).
    pub fn get_multi(&self, partition: u16, queue: &mut FetchQueue) -> StoreResult<()> {
        for (key, waiters) in queue.entries_mut() {
            let meta_only = waiters.iter().all(|w| w.meta_only);
            let value = self.fetch(key, partition, meta_only, meta_only)?;
            for waiter in waiters.iter_mut() {
                waiter.value = Some(value.clone());
            }
        }
        Ok(())
    }

    /// Cached state of an owned partition. Asking for a partition the shard
    /// does not own is a contract violation.
    pub fn get_partition_state(&self, partition: u16) -> StoreResult<&PartitionState> {
        self.states
            .get(&partition)
            .ok_or_else(|| HandleError::PartitionNotOwned(partition).into())
    }

    /// Every owned partition with its cached state, ascending.
    pub fn list_persisted_partitions(&self) -> Vec<(u16, PartitionState)> {
        self.states
            .iter()
            .map(|(partition, state)| (*partition, state.clone()))
            .collect()
    }

    /// Replace and persist a partition's state. It becomes durable with the
    /// next commit.
    pub fn update_partition_state(&mut self, partition: u16, state: PartitionState) -> StoreResult<()> {
        self.check_writable(partition)?;
        self.state_store.write_state(partition, &state)?;
        self.metrics.increment_state_writes();
        self.states.insert(partition, state);
        Ok(())
    }

    /// Replace and persist a partition's state, then commit durably.
    pub fn snapshot_partition(&mut self, partition: u16, state: PartitionState) -> StoreResult<bool> {
        self.update_partition_state(partition, state)?;
        Ok(self.durable_commit("snapshot").is_ok())
    }

    /// Roll a partition back to `target_seqno`.
    ///
    /// Only two targets are supported: one at or past the last persisted
    /// snapshot end (nothing to undo) and zero (the partition is reset).
    /// Anything else reports failure so the caller resets the partition.
    pub fn rollback(&mut self, partition: u16, target_seqno: u64) -> StoreResult<RollbackResult> {
        self.check_writable(partition)?;
        let state = self.states.get(&partition).cloned().unwrap_or_default();

        let result = if target_seqno >= state.snap_end {
            RollbackResult {
                success: true,
                high_seqno: state.snap_end,
                snap_start: state.snap_start,
                snap_end: state.snap_end,
            }
        } else if target_seqno == 0 {
            self.reset_partition(partition)?;
            RollbackResult {
                success: true,
                high_seqno: 0,
                snap_start: 0,
                snap_end: 0,
            }
        } else {
            RollbackResult {
                success: false,
                high_seqno: 0,
                snap_start: 0,
                snap_end: 0,
            }
        };

        self.logger.info(
            Event::Rollback,
            &[
                ("partition", &partition.to_string()),
                ("success", &result.success.to_string()),
                ("target", &target_seqno.to_string()),
            ],
        );
        Ok(result)
    }

    /// Remove every document of a partition and reset its state to the
    /// default, durably. Returns the number of entries removed.
    pub fn reset_partition(&mut self, partition: u16) -> StoreResult<u64> {
        self.check_writable(partition)?;
        let handle = self.handle_or_error(partition)?;

        let mut removed = 0;
        for doc in handle.scan().map_err(StoreError::Engine)? {
            if handle.purge(&doc.key).map_err(StoreError::Engine)? {
                removed += 1;
            }
        }

        let state = PartitionState::default();
        self.state_store.write_state(partition, &state)?;
        self.metrics.increment_state_writes();
        self.states.insert(partition, state);
        self.durable_commit("reset")?;

        self.logger.info(
            Event::PartitionReset,
            &[
                ("partition", &partition.to_string()),
                ("removed", &removed.to_string()),
            ],
        );
        Ok(removed)
    }

    /// Purge eligible tombstones from a partition and commit durably.
    pub fn compact_partition(
        &mut self,
        partition: u16,
        config: &CompactionConfig,
    ) -> StoreResult<CompactionStats> {
        self.check_writable(partition)?;
        let handle = self.handle_or_error(partition)?;

        let mut stats = CompactionStats::default();
        for doc in handle.scan().map_err(StoreError::Engine)? {
            stats.examined += 1;
            if !doc.deleted {
                continue;
            }

            let meta = match envelope::decode(&doc.meta) {
                Ok(meta) => meta,
                Err(e) => {
                    stats.skipped += 1;
                    self.logger.warn(
                        Event::CompactionSkipped,
                        &[
                            ("error", &e.to_string()),
                            ("key", &String::from_utf8_lossy(&doc.key)),
                            ("partition", &partition.to_string()),
                        ],
                    );
                    continue;
                }
            };
            let expired = config.drop_deletes || meta.deleted_time < config.purge_before_ts;
            let too_recent =
                config.purge_before_seq != 0 && meta.rev_seqno >= config.purge_before_seq;
            if expired && !too_recent && handle.purge(&doc.key).map_err(StoreError::Engine)? {
                stats.purged += 1;
            }
        }

        self.durable_commit("compaction")?;
        self.metrics.add_tombstones_purged(stats.purged);
        self.logger.info(
            Event::CompactionComplete,
            &[
                ("examined", &stats.examined.to_string()),
                ("partition", &partition.to_string()),
                ("purged", &stats.purged.to_string()),
                ("skipped", &stats.skipped.to_string()),
            ],
        );
        Ok(stats)
    }

    /// Order a flush batch by key, newest mutation of each key first.
    pub fn optimize_writes(docs: &mut [Document]) {
        docs.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| b.by_seqno.cmp(&a.by_seqno)));
    }

    pub fn storage_properties(&self) -> StorageProperties {
        StorageProperties {
            efficient_partition_dump: true,
            efficient_partition_deletion: true,
            persisted_deletions: true,
            efficient_get: true,
        }
    }

    /// Write engine statistics to `stats.json` in the data directory.
    pub fn snapshot_stats(&self, stats: &BTreeMap<String, String>) -> StoreResult<PathBuf> {
        let dir = self.config.data_path();
        let path = dir.join(STATS_FILE_NAME);
        let tmp = dir.join(format!("{}.new", STATS_FILE_NAME));

        let json = serde_json::to_vec_pretty(stats)
            .map_err(|e| StoreError::io(tmp.display().to_string(), e.into()))?;
        fs::write(&tmp, json).map_err(|e| StoreError::io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(path.display().to_string(), e))?;
        Ok(path)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, partition: u16) -> StoreResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        if !self.registry.is_owned(partition) {
            return Err(HandleError::PartitionNotOwned(partition).into());
        }
        Ok(())
    }

    fn check_mutation(&self, partition: u16) -> StoreResult<()> {
        self.check_writable(partition)?;
        self.queue.ensure_open()?;
        Ok(())
    }

    /// Write handle, with open failures handed back as an engine error so
    /// the mutation can be recorded as failed.
    fn write_handle(&self, partition: u16) -> StoreResult<Result<Arc<dyn KvsHandle>, EngineError>> {
        match self.registry.get_write_handle(partition) {
            Ok(handle) => Ok(Ok(handle)),
            Err(HandleError::OpenFailure { source, .. }) => Ok(Err(source)),
            Err(e) => Err(e.into()),
        }
    }

    fn log_mutation_failure(&self, event: Event, doc: &Document, request: &MutationRequest) {
        let error = request
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        self.logger.error(
            event,
            &[
                ("error", &error),
                ("key", &doc.key_display()),
                ("partition", &doc.partition.to_string()),
            ],
        );
    }

    fn handle_or_error(&self, partition: u16) -> StoreResult<Arc<dyn KvsHandle>> {
        Ok(self.registry.get_write_handle(partition)?)
    }

    fn durable_commit(&self, reason: &str) -> StoreResult<()> {
        self.file.commit().map_err(|e| {
            self.metrics.increment_commit_failures();
            self.logger.error(
                Event::CommitFailed,
                &[("error", &e.to_string()), ("reason", reason)],
            );
            StoreError::Engine(e)
        })?;
        self.metrics.increment_commits();
        Ok(())
    }

    fn fetch(
        &self,
        key: &[u8],
        partition: u16,
        fetch_deleted: bool,
        meta_only: bool,
    ) -> StoreResult<GetValue> {
        self.ensure_open()?;
        let key_str = String::from_utf8_lossy(key);
        let partition_str = partition.to_string();

        let handle = match self.registry.get_read_handle(partition) {
            Ok(handle) => handle,
            Err(HandleError::OpenFailure { source, .. }) => {
                self.logger.warn(
                    Event::GetFailed,
                    &[
                        ("error", &source.to_string()),
                        ("key", &key_str),
                        ("partition", &partition_str),
                    ],
                );
                return Ok(GetValue::failed());
            }
            Err(e) => return Err(e.into()),
        };

        self.metrics.increment_gets();
        let doc = match handle.get(key) {
            Ok(Some(doc)) => doc,
            Ok(None) => return Ok(GetValue::not_found()),
            Err(e) if e.is_not_found() => return Ok(GetValue::not_found()),
            Err(e) => {
                self.logger.warn(
                    Event::GetFailed,
                    &[
                        ("error", &e.to_string()),
                        ("key", &key_str),
                        ("partition", &partition_str),
                    ],
                );
                return Ok(GetValue::failed());
            }
        };

        if doc.deleted && !fetch_deleted {
            return Ok(GetValue::not_found());
        }

        let metadata = match envelope::decode(&doc.meta) {
            Ok(metadata) => metadata,
            Err(e) => {
                self.logger.warn(
                    Event::GetFailed,
                    &[
                        ("error", &e.to_string()),
                        ("key", &key_str),
                        ("partition", &partition_str),
                    ],
                );
                return Ok(GetValue::failed());
            }
        };

        Ok(GetValue::found(StoredItem {
            key: doc.key,
            partition,
            metadata,
            body: if meta_only { None } else { Some(doc.body) },
            deleted: doc.deleted,
        }))
    }
}

impl Drop for ShardStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn load_states(
    file: &dyn EngineFile,
    owned: &[u16],
    logger: &Logger,
) -> StoreResult<(PartitionStateStore, BTreeMap<u16, PartitionState>)> {
    let state_store = PartitionStateStore::open(file, logger.clone())?;
    let mut states = BTreeMap::new();
    for &partition in owned {
        states.insert(partition, state_store.read_state(partition)?);
    }
    Ok((state_store, states))
}
