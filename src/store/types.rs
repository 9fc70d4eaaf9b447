//! Values exchanged with the adapter's callers

use std::collections::BTreeMap;

use serde::Serialize;

use crate::envelope::DocumentMetadata;

/// Outcome of a single-key lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GetStatus {
    Success,
    NotFound,
    Failed,
}

/// A document read back from a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredItem {
    #[serde(serialize_with = "serialize_lossy")]
    pub key: Vec<u8>,
    pub partition: u16,
    pub metadata: DocumentMetadata,
    /// `None` for metadata-only fetches
    #[serde(skip)]
    pub body: Option<Vec<u8>>,
    pub deleted: bool,
}

fn serialize_lossy<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// Result of a lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetValue {
    pub status: GetStatus,
    pub item: Option<StoredItem>,
    /// Only the metadata was fetched
    pub partial: bool,
}

impl GetValue {
    pub fn found(item: StoredItem) -> Self {
        let partial = item.body.is_none();
        Self {
            status: GetStatus::Success,
            item: Some(item),
            partial,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: GetStatus::NotFound,
            item: None,
            partial: false,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: GetStatus::Failed,
            item: None,
            partial: false,
        }
    }

    pub fn is_found(&self) -> bool {
        self.status == GetStatus::Success
    }
}

/// One waiter on a background fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// The waiter only needs metadata
    pub meta_only: bool,
    /// Filled by `get_multi`
    pub value: Option<GetValue>,
}

/// Keys to fetch from one partition, each with its waiters.
#[derive(Debug, Clone, Default)]
pub struct FetchQueue {
    entries: BTreeMap<Vec<u8>, Vec<FetchRequest>>,
}

impl FetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key`.
    pub fn add(&mut self, key: impl Into<Vec<u8>>, meta_only: bool) {
        self.entries.entry(key.into()).or_default().push(FetchRequest {
            meta_only,
            value: None,
        });
    }

    /// Waiters on `key`.
    pub fn waiters(&self, key: &[u8]) -> Option<&[FetchRequest]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (&Vec<u8>, &mut Vec<FetchRequest>)> {
        self.entries.iter_mut()
    }
}

/// Outcome of a rollback request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RollbackResult {
    /// `false` means the caller must fall back to a full partition reset
    pub success: bool,
    pub high_seqno: u64,
    pub snap_start: u64,
    pub snap_end: u64,
}

/// Tombstone purge parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionConfig {
    /// Purge tombstones deleted before this time (seconds since the epoch)
    pub purge_before_ts: u32,
    /// When non-zero, keep tombstones with a revision at or above this
    pub purge_before_seq: u64,
    /// Purge every tombstone regardless of age
    pub drop_deletes: bool,
}

/// What compaction did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompactionStats {
    /// Entries scanned
    pub examined: u64,
    /// Tombstones removed
    pub purged: u64,
    /// Tombstones kept because their metadata could not be decoded
    pub skipped: u64,
}

/// Capabilities of this backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageProperties {
    pub efficient_partition_dump: bool,
    pub efficient_partition_deletion: bool,
    pub persisted_deletions: bool,
    pub efficient_get: bool,
}
