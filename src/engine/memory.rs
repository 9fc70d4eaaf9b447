//! In-process engine
//!
//! Keeps a committed image and a working image per file. Writes land in
//! the working image; `commit` copies it over the committed image; closing
//! or reopening a file throws the working image away. Files live as long
//! as the [`MemoryEngine`] value (and its clones), so a store can be closed
//! and reopened against the same engine to observe what was made durable.
//!
//! Faults can be injected to exercise failure paths: failing commits,
//! failing sets, and sub-stores that refuse to open.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::errors::{EngineError, EngineResult};
use super::{EngineFile, FileConfig, KvsConfig, KvsHandle, StorageEngine, StoredDoc};

type Tables = BTreeMap<String, BTreeMap<Vec<u8>, StoredDoc>>;

#[derive(Debug, Default)]
struct FileImages {
    committed: Tables,
    working: Tables,
}

#[derive(Debug, Default)]
struct Faults {
    fail_commit: AtomicBool,
    fail_set: AtomicBool,
    failing_kvs: Mutex<HashSet<String>>,
}

impl Faults {
    fn kvs_fails(&self, name: &str) -> bool {
        self.failing_kvs
            .lock()
            .map(|names| names.contains(name))
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct EngineState {
    files: Mutex<HashMap<PathBuf, Arc<Mutex<FileImages>>>>,
    faults: Faults,
}

/// Storage engine that keeps every file in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryEngine {
    state: Arc<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent durability commit fail.
    pub fn fail_commits(&self, fail: bool) {
        self.state.faults.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent set fail with a write error.
    pub fn fail_sets(&self, fail: bool) {
        self.state.faults.fail_set.store(fail, Ordering::SeqCst);
    }

    /// Make opening the named sub-store fail.
    pub fn fail_kvs_open(&self, name: impl Into<String>) {
        if let Ok(mut names) = self.state.faults.failing_kvs.lock() {
            names.insert(name.into());
        }
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.fail_commits(false);
        self.fail_sets(false);
        if let Ok(mut names) = self.state.faults.failing_kvs.lock() {
            names.clear();
        }
    }

    /// Committed entry for `key` in sub-store `kvs` of the file at `path`.
    pub fn committed_doc(&self, path: &Path, kvs: &str, key: &[u8]) -> Option<StoredDoc> {
        let files = self.state.files.lock().ok()?;
        let images = files.get(path)?.lock().ok()?;
        images.committed.get(kvs)?.get(key).cloned()
    }

    /// Paths of every file opened through this engine.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.state
            .files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl StorageEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, path: &Path, config: &FileConfig) -> EngineResult<Box<dyn EngineFile>> {
        let mut files = self
            .state
            .files
            .lock()
            .map_err(|_| EngineError::LockPoisoned)?;

        if !config.create_if_missing && !files.contains_key(path) {
            return Err(EngineError::NoSuchFile(path.display().to_string()));
        }

        let images = Arc::clone(files.entry(path.to_path_buf()).or_default());
        {
            let mut guard = images.lock().map_err(|_| EngineError::LockPoisoned)?;
            guard.working = guard.committed.clone();
        }

        Ok(Box::new(MemoryFile {
            path: path.to_path_buf(),
            images,
            engine: Arc::clone(&self.state),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct MemoryFile {
    path: PathBuf,
    images: Arc<Mutex<FileImages>>,
    engine: Arc<EngineState>,
    closed: Arc<AtomicBool>,
}

impl EngineFile for MemoryFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn open_kvs(&self, name: &str, config: &KvsConfig) -> EngineResult<Arc<dyn KvsHandle>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        if self.engine.faults.kvs_fails(name) {
            return Err(EngineError::open_failed(name, "injected fault"));
        }

        let mut images = self.images.lock().map_err(|_| EngineError::LockPoisoned)?;
        if !images.working.contains_key(name) {
            if !config.create_if_missing {
                return Err(EngineError::open_failed(name, "sub-store does not exist"));
            }
            images.working.insert(name.to_string(), BTreeMap::new());
        }

        Ok(Arc::new(MemoryKvs {
            name: name.to_string(),
            images: Arc::clone(&self.images),
            engine: Arc::clone(&self.engine),
            closed: Arc::clone(&self.closed),
        }))
    }

    fn commit(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        if self.engine.faults.fail_commit.load(Ordering::SeqCst) {
            return Err(EngineError::CommitFailed("injected fault".to_string()));
        }

        let mut images = self.images.lock().map_err(|_| EngineError::LockPoisoned)?;
        images.committed = images.working.clone();
        Ok(())
    }

    fn close(&self) -> EngineResult<()> {
        self.closed.store(true, Ordering::Release);
        let mut images = self.images.lock().map_err(|_| EngineError::LockPoisoned)?;
        images.working = images.committed.clone();
        Ok(())
    }
}

struct MemoryKvs {
    name: String,
    images: Arc<Mutex<FileImages>>,
    engine: Arc<EngineState>,
    closed: Arc<AtomicBool>,
}

impl MemoryKvs {
    fn with_table<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<Vec<u8>, StoredDoc>) -> EngineResult<R>,
    ) -> EngineResult<R> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        let mut images = self.images.lock().map_err(|_| EngineError::LockPoisoned)?;
        let table = images.working.entry(self.name.clone()).or_default();
        f(table)
    }
}

impl KvsHandle for MemoryKvs {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> EngineResult<Option<StoredDoc>> {
        self.with_table(|table| Ok(table.get(key).cloned()))
    }

    fn set(&self, key: &[u8], meta: &[u8], body: &[u8]) -> EngineResult<()> {
        if self.engine.faults.fail_set.load(Ordering::SeqCst) {
            return Err(EngineError::WriteFailed("injected fault".to_string()));
        }
        self.with_table(|table| {
            table.insert(
                key.to_vec(),
                StoredDoc {
                    key: key.to_vec(),
                    meta: meta.to_vec(),
                    body: body.to_vec(),
                    deleted: false,
                },
            );
            Ok(())
        })
    }

    fn delete(&self, key: &[u8], meta: &[u8]) -> EngineResult<()> {
        self.with_table(|table| match table.get_mut(key) {
            Some(doc) if !doc.deleted => {
                doc.meta = meta.to_vec();
                doc.body.clear();
                doc.deleted = true;
                Ok(())
            }
            _ => Err(EngineError::KeyNotFound),
        })
    }

    fn scan(&self) -> EngineResult<Vec<StoredDoc>> {
        self.with_table(|table| Ok(table.values().cloned().collect()))
    }

    fn purge(&self, key: &[u8]) -> EngineResult<bool> {
        self.with_table(|table| Ok(table.remove(key).is_some()))
    }
}
