//! Shard data file naming
//!
//! Each shard keeps one file `<shard_id>.fdb.<rev>` in the data directory.
//! The revision in use is the highest numeric suffix among the files with
//! that exact prefix, or 1 when there are none.

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{StoreError, StoreResult};

/// Revision used when no data file exists yet
pub const INITIAL_REVISION: u64 = 1;

/// File name prefix shared by every revision of a shard's file
pub fn file_prefix(shard_id: u16) -> String {
    format!("{}.fdb.", shard_id)
}

/// Path of revision `rev` of a shard's data file.
pub fn shard_file_path(dir: &Path, shard_id: u16, rev: u64) -> PathBuf {
    dir.join(format!("{}{}", file_prefix(shard_id), rev))
}

/// Create the data directory if it does not exist.
pub fn ensure_data_dir(dir: &Path) -> StoreResult<()> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir.display().to_string(), e))
}

/// Highest revision among the shard's existing files.
///
/// A matching file whose suffix is not a positive integer is an error.
pub fn discover_revision(dir: &Path, shard_id: u16) -> StoreResult<u64> {
    let prefix = file_prefix(shard_id);
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir.display().to_string(), e))?;

    let mut revision = None;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir.display().to_string(), e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        let suffix = match name.strip_prefix(&prefix) {
            Some(suffix) => suffix,
            None => continue,
        };

        let rev = match suffix.parse::<u64>() {
            Ok(rev) if rev > 0 => rev,
            _ => {
                return Err(StoreError::InvalidRevision {
                    file: name.into_owned(),
                })
            }
        };

        revision = Some(revision.map_or(rev, |current: u64| current.max(rev)));
    }

    Ok(revision.unwrap_or(INITIAL_REVISION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_empty_dir_uses_initial_revision() {
        let temp = TempDir::new().unwrap();
        assert_eq!(discover_revision(temp.path(), 0).unwrap(), 1);
    }

    #[test]
    fn test_highest_revision_wins() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "0.fdb.1");
        touch(temp.path(), "0.fdb.3");
        touch(temp.path(), "10.fdb.9");
        touch(temp.path(), "1.fdb.7");
        touch(temp.path(), "stats.json");

        assert_eq!(discover_revision(temp.path(), 0).unwrap(), 3);
        assert_eq!(discover_revision(temp.path(), 1).unwrap(), 7);
        assert_eq!(discover_revision(temp.path(), 10).unwrap(), 9);
        assert_eq!(discover_revision(temp.path(), 2).unwrap(), 1);
    }

    #[test]
    fn test_non_numeric_revision_is_error() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "0.fdb.1");
        touch(temp.path(), "0.fdb.old");

        assert!(matches!(
            discover_revision(temp.path(), 0),
            Err(StoreError::InvalidRevision { file }) if file == "0.fdb.old"
        ));
    }

    #[test]
    fn test_shard_file_path() {
        assert_eq!(
            shard_file_path(Path::new("/data"), 2, 5),
            PathBuf::from("/data/2.fdb.5")
        );
    }
}
