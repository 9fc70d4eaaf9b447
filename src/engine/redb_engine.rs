//! redb-backed engine
//!
//! One redb database per engine file; each sub-store is a redb table keyed
//! by raw bytes. A single write transaction is begun by the first write
//! after a commit and stays open until the next one, so per-key writes are
//! applied immediately and made durable together by
//! [`EngineFile::commit`]. Lookups go through that transaction while it is
//! open and through a read transaction otherwise, so a store that never
//! writes never takes the write lock.
//!
//! Stored value layout:
//!
//! ```text
//! +-----------------+
//! | Tombstone Flag  | (u8: 0 = live, 1 = deleted)
//! +-----------------+
//! | Meta Length     | (u16 LE)
//! +-----------------+
//! | Checksum        | (u32 LE, CRC32 of meta + body)
//! +-----------------+
//! | Meta            | (opaque)
//! +-----------------+
//! | Body            | (rest of value)
//! +-----------------+
//! ```
//!
//! Every read verifies the checksum; a mismatch is reported as a corrupt
//! record.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crc32fast::Hasher;
use ::redb::{
    Database, ReadOnlyTable, ReadableTable, TableDefinition, TableError, TableHandle,
    WriteTransaction,
};

use super::errors::{EngineError, EngineResult};
use super::{EngineFile, FileConfig, KvsConfig, KvsHandle, StorageEngine, StoredDoc};

const RECORD_HEADER_LEN: usize = 1 + 2 + 4;

type RawTable = ReadOnlyTable<&'static [u8], &'static [u8]>;

fn table_def(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

fn read_err(e: impl ToString) -> EngineError {
    EngineError::ReadFailed(e.to_string())
}

fn encode_record(deleted: bool, meta: &[u8], body: &[u8]) -> EngineResult<Vec<u8>> {
    let meta_len = u16::try_from(meta.len())
        .map_err(|_| EngineError::WriteFailed(format!("metadata too large: {} bytes", meta.len())))?;

    let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + meta.len() + body.len());
    buf.push(if deleted { 1 } else { 0 });
    buf.extend_from_slice(&meta_len.to_le_bytes());
    buf.extend_from_slice(&checksum(meta, body).to_le_bytes());
    buf.extend_from_slice(meta);
    buf.extend_from_slice(body);
    Ok(buf)
}

fn checksum(meta: &[u8], body: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(meta);
    hasher.update(body);
    hasher.finalize()
}

fn decode_record(kvs: &str, key: &[u8], value: &[u8]) -> EngineResult<StoredDoc> {
    let corrupt = |reason: String| EngineError::CorruptRecord {
        kvs: kvs.to_string(),
        reason,
    };

    if value.len() < RECORD_HEADER_LEN {
        return Err(corrupt(format!("record too short: {} bytes", value.len())));
    }

    let deleted = match value[0] {
        0 => false,
        1 => true,
        other => return Err(corrupt(format!("invalid tombstone flag {}", other))),
    };

    let meta_len = u16::from_le_bytes([value[1], value[2]]) as usize;
    let meta_end = RECORD_HEADER_LEN + meta_len;
    if value.len() < meta_end {
        return Err(corrupt(format!(
            "metadata truncated: expected {} bytes, got {}",
            meta_len,
            value.len() - RECORD_HEADER_LEN
        )));
    }

    let meta = &value[RECORD_HEADER_LEN..meta_end];
    let body = &value[meta_end..];
    let expected = u32::from_le_bytes([value[3], value[4], value[5], value[6]]);
    if checksum(meta, body) != expected {
        return Err(corrupt("checksum mismatch".to_string()));
    }

    Ok(StoredDoc {
        key: key.to_vec(),
        meta: meta.to_vec(),
        body: body.to_vec(),
        deleted,
    })
}

fn is_live(value: &[u8]) -> bool {
    value.first() == Some(&0)
}

fn get_record<T>(table: &T, kvs: &str, key: &[u8]) -> EngineResult<Option<StoredDoc>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    match table.get(key).map_err(read_err)? {
        Some(value) => Ok(Some(decode_record(kvs, key, value.value())?)),
        None => Ok(None),
    }
}

fn scan_records<T>(table: &T, kvs: &str) -> EngineResult<Vec<StoredDoc>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut docs = Vec::new();
    for item in table.iter().map_err(read_err)? {
        let (key, value) = item.map_err(read_err)?;
        docs.push(decode_record(kvs, key.value(), value.value())?);
    }
    Ok(docs)
}

/// Storage engine backed by redb files.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedbEngine;

impl RedbEngine {
    pub fn new() -> Self {
        Self
    }
}

impl StorageEngine for RedbEngine {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn open(&self, path: &Path, config: &FileConfig) -> EngineResult<Box<dyn EngineFile>> {
        Ok(Box::new(RedbFile::open(path, config)?))
    }
}

struct Shared {
    /// Open write transaction, begun lazily after each commit. Declared
    /// before `db` so it is dropped first.
    txn: Mutex<Option<WriteTransaction>>,
    db: Database,
    path: PathBuf,
    closed: AtomicBool,
}

impl Shared {
    fn pending(&self) -> EngineResult<MutexGuard<'_, Option<WriteTransaction>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        self.txn.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn with_txn<R>(&self, f: impl FnOnce(&WriteTransaction) -> EngineResult<R>) -> EngineResult<R> {
        let mut guard = self.pending()?;
        if guard.is_none() {
            let txn = self
                .db
                .begin_write()
                .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
            *guard = Some(txn);
        }

        let txn = guard.as_ref().ok_or(EngineError::Closed)?;
        f(txn)
    }

    /// Committed table `name`, or `None` if it has never been committed.
    fn committed_table(&self, name: &str) -> EngineResult<Option<RawTable>> {
        let txn = self.db.begin_read().map_err(read_err)?;
        match txn.open_table(table_def(name)) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(read_err(e)),
        }
    }
}

struct RedbFile {
    shared: Arc<Shared>,
}

impl RedbFile {
    fn open(path: &Path, config: &FileConfig) -> EngineResult<Self> {
        if !config.create_if_missing && !path.exists() {
            return Err(EngineError::NoSuchFile(path.display().to_string()));
        }

        let db = Database::create(path)
            .map_err(|e| EngineError::open_failed(path.display().to_string(), e))?;

        Ok(Self {
            shared: Arc::new(Shared {
                path: path.to_path_buf(),
                db,
                txn: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        })
    }

    #[cfg(test)]
    fn has_pending_writes(&self) -> bool {
        self.shared
            .txn
            .lock()
            .map(|txn| txn.is_some())
            .unwrap_or(false)
    }
}

impl EngineFile for RedbFile {
    fn path(&self) -> &Path {
        &self.shared.path
    }

    fn open_kvs(&self, name: &str, config: &KvsConfig) -> EngineResult<Arc<dyn KvsHandle>> {
        let idle = self.shared.pending()?.is_none();
        let committed = idle && self.shared.committed_table(name)?.is_some();

        if !committed {
            self.shared.with_txn(|txn| {
                if !config.create_if_missing {
                    let exists = txn
                        .list_tables()
                        .map_err(|e| EngineError::open_failed(name, e))?
                        .any(|handle| handle.name() == name);
                    if !exists {
                        return Err(EngineError::open_failed(name, "sub-store does not exist"));
                    }
                }
                txn.open_table(table_def(name))
                    .map_err(|e| EngineError::open_failed(name, e))?;
                Ok(())
            })?;
        }

        Ok(Arc::new(RedbKvs {
            name: name.to_string(),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn commit(&self) -> EngineResult<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }

        let txn = self
            .shared
            .txn
            .lock()
            .map_err(|_| EngineError::LockPoisoned)?
            .take();

        match txn {
            Some(txn) => txn
                .commit()
                .map_err(|e| EngineError::CommitFailed(e.to_string())),
            None => Ok(()),
        }
    }

    fn close(&self) -> EngineResult<()> {
        self.shared.closed.store(true, Ordering::Release);

        let txn = self
            .shared
            .txn
            .lock()
            .map_err(|_| EngineError::LockPoisoned)?
            .take();

        if let Some(txn) = txn {
            txn.abort()
                .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
        }
        Ok(())
    }
}

struct RedbKvs {
    name: String,
    shared: Arc<Shared>,
}

impl KvsHandle for RedbKvs {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> EngineResult<Option<StoredDoc>> {
        let guard = self.shared.pending()?;
        match guard.as_ref() {
            Some(txn) => {
                let table = txn.open_table(table_def(&self.name)).map_err(read_err)?;
                get_record(&table, &self.name, key)
            }
            None => match self.shared.committed_table(&self.name)? {
                Some(table) => get_record(&table, &self.name, key),
                None => Ok(None),
            },
        }
    }

    fn set(&self, key: &[u8], meta: &[u8], body: &[u8]) -> EngineResult<()> {
        let record = encode_record(false, meta, body)?;
        self.shared.with_txn(|txn| {
            let mut table = txn
                .open_table(table_def(&self.name))
                .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
            table
                .insert(key, record.as_slice())
                .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
            Ok(())
        })
    }

    fn delete(&self, key: &[u8], meta: &[u8]) -> EngineResult<()> {
        let record = encode_record(true, meta, &[])?;
        self.shared.with_txn(|txn| {
            let mut table = txn
                .open_table(table_def(&self.name))
                .map_err(|e| EngineError::WriteFailed(e.to_string()))?;

            let live = table
                .get(key)
                .map_err(read_err)?
                .map(|value| is_live(value.value()))
                .unwrap_or(false);
            if !live {
                return Err(EngineError::KeyNotFound);
            }

            table
                .insert(key, record.as_slice())
                .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
            Ok(())
        })
    }

    fn scan(&self) -> EngineResult<Vec<StoredDoc>> {
        let guard = self.shared.pending()?;
        match guard.as_ref() {
            Some(txn) => {
                let table = txn.open_table(table_def(&self.name)).map_err(read_err)?;
                scan_records(&table, &self.name)
            }
            None => match self.shared.committed_table(&self.name)? {
                Some(table) => scan_records(&table, &self.name),
                None => Ok(Vec::new()),
            },
        }
    }

    fn purge(&self, key: &[u8]) -> EngineResult<bool> {
        self.shared.with_txn(|txn| {
            let mut table = txn
                .open_table(table_def(&self.name))
                .map_err(|e| EngineError::WriteFailed(e.to_string()))?;
            let removed = table
                .remove(key)
                .map_err(|e| EngineError::WriteFailed(e.to_string()))?
                .is_some();
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp(dir: &TempDir) -> Box<dyn EngineFile> {
        RedbEngine::new()
            .open(&dir.path().join("0.fdb.1"), &FileConfig::default())
            .unwrap()
    }

    #[test]
    fn test_record_roundtrip() {
        let encoded = encode_record(true, b"meta", b"").unwrap();
        let doc = decode_record("p0", b"k", &encoded).unwrap();
        assert!(doc.deleted);
        assert_eq!(doc.meta, b"meta");
        assert!(doc.body.is_empty());
    }

    #[test]
    fn test_flipped_body_bit_is_corrupt() {
        let mut encoded = encode_record(false, b"meta", b"body").unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;
        assert!(matches!(
            decode_record("p0", b"k", &encoded),
            Err(EngineError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_truncated_record_is_corrupt() {
        let err = decode_record("p0", b"k", &[0, 9, 0, 1]).unwrap_err();
        assert!(matches!(err, EngineError::CorruptRecord { .. }));
    }

    #[test]
    fn test_set_get_visible_before_commit() {
        let dir = TempDir::new().unwrap();
        let file = open_temp(&dir);
        let kvs = file.open_kvs("partition0", &KvsConfig::default()).unwrap();

        kvs.set(b"k1", b"m", b"v").unwrap();
        let doc = kvs.get(b"k1").unwrap().unwrap();
        assert_eq!(doc.body, b"v");
        assert!(!doc.deleted);
    }

    #[test]
    fn test_commit_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.fdb.1");
        {
            let file = RedbEngine.open(&path, &FileConfig::default()).unwrap();
            let kvs = file.open_kvs("partition0", &KvsConfig::default()).unwrap();
            kvs.set(b"durable", b"m", b"v").unwrap();
            file.commit().unwrap();
            kvs.set(b"lost", b"m", b"v").unwrap();
            file.close().unwrap();
        }

        let file = RedbEngine.open(&path, &FileConfig::default()).unwrap();
        let kvs = file.open_kvs("partition0", &KvsConfig::default()).unwrap();
        assert!(kvs.get(b"durable").unwrap().is_some());
        assert!(kvs.get(b"lost").unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let file = open_temp(&dir);
        let kvs = file.open_kvs("partition0", &KvsConfig::default()).unwrap();

        assert_eq!(kvs.delete(b"nope", b"m"), Err(EngineError::KeyNotFound));

        kvs.set(b"k", b"m", b"v").unwrap();
        kvs.delete(b"k", b"tomb").unwrap();
        assert_eq!(kvs.delete(b"k", b"tomb"), Err(EngineError::KeyNotFound));

        let tomb = kvs.get(b"k").unwrap().unwrap();
        assert!(tomb.deleted);
        assert_eq!(tomb.meta, b"tomb");
    }

    #[test]
    fn test_scan_and_purge() {
        let dir = TempDir::new().unwrap();
        let file = open_temp(&dir);
        let kvs = file.open_kvs("partition2", &KvsConfig::default()).unwrap();

        kvs.set(b"b", b"m", b"2").unwrap();
        kvs.set(b"a", b"m", b"1").unwrap();
        let keys: Vec<_> = kvs.scan().unwrap().into_iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

        assert!(kvs.purge(b"a").unwrap());
        assert!(!kvs.purge(b"a").unwrap());
        assert_eq!(kvs.scan().unwrap().len(), 1);
    }

    #[test]
    fn test_closed_file_rejects_operations() {
        let dir = TempDir::new().unwrap();
        let file = open_temp(&dir);
        let kvs = file.open_kvs("partition0", &KvsConfig::default()).unwrap();
        file.close().unwrap();

        assert_eq!(kvs.get(b"k"), Err(EngineError::Closed));
        assert_eq!(file.commit(), Err(EngineError::Closed));
    }

    #[test]
    fn test_reads_of_committed_data_take_no_write_transaction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.fdb.1");
        {
            let file = RedbFile::open(&path, &FileConfig::default()).unwrap();
            let kvs = file.open_kvs("partition0", &KvsConfig::default()).unwrap();
            kvs.set(b"k", b"m", b"v").unwrap();
            file.commit().unwrap();
            file.close().unwrap();
        }

        let file = RedbFile::open(&path, &FileConfig::default()).unwrap();
        let kvs = file.open_kvs("partition0", &KvsConfig::default()).unwrap();
        assert_eq!(kvs.get(b"k").unwrap().unwrap().body, b"v");
        assert!(kvs.get(b"absent").unwrap().is_none());
        assert_eq!(kvs.scan().unwrap().len(), 1);
        assert!(!file.has_pending_writes());

        kvs.set(b"k2", b"m", b"v2").unwrap();
        assert!(file.has_pending_writes());
        assert_eq!(kvs.scan().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_file_without_create() {
        let dir = TempDir::new().unwrap();
        let config = FileConfig {
            create_if_missing: false,
        };
        let result = RedbEngine.open(&dir.path().join("absent"), &config);
        assert!(matches!(result, Err(EngineError::NoSuchFile(_))));
    }
}
