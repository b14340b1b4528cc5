//! File-backed record store for persistent replicas.

use crate::error::{StoreError, StoreResult};
use crate::gateway::{RecordStore, RecordTxn};
use crate::overlay::{apply_writes, OverlayTxn, RecordTable};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use todosync_protocol::Record;
use tracing::debug;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<Record>,
}

/// A record store persisted as a JSON snapshot file.
///
/// Every writing commit rewrites the whole snapshot to a sibling temporary
/// file, syncs it and renames it over the previous one, so a crash leaves
/// either the old or the new state on disk.
///
/// # Example
///
/// ```no_run
/// use todosync_store::{FileStore, RecordStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("replica.json")).unwrap();
/// println!("{} records", store.len().unwrap());
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: Mutex<RecordTable>,
    closed: AtomicBool,
}

impl FileStore {
    /// Opens the snapshot at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupted` if the file is not a valid snapshot.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let records = if path.exists() {
            Self::load(path)?
        } else {
            RecordTable::new()
        };
        debug!(path = %path.display(), records = records.len(), "opened file store");

        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
            closed: AtomicBool::new(false),
        })
    }

    /// Opens the snapshot, creating parent directories if needed.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> StoreResult<RecordTable> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)
            .map_err(|e| StoreError::Corrupted(format!("{}: {e}", path.display())))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Corrupted(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let mut table = RecordTable::new();
        for record in snapshot.records {
            let key = record.key();
            if table.insert(key.clone(), record).is_some() {
                return Err(StoreError::Corrupted(format!("duplicate record {key}")));
            }
        }
        Ok(table)
    }

    fn persist(&self, table: &RecordTable) -> StoreResult<()> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            let snapshot = Snapshot {
                version: SNAPSHOT_VERSION,
                records: table.values().cloned().collect(),
            };
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
            writer.flush()?;
            writer
                .into_inner()
                .map_err(|e| StoreError::Io(e.into_error()))?
                .sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), records = table.len(), "persisted snapshot");
        Ok(())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RecordStore for FileStore {
    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn RecordTxn) -> StoreResult<T>,
    {
        self.ensure_open()?;
        let mut records = self.records.lock();

        let mut txn = OverlayTxn::new(&records);
        let result = f(&mut txn)?;
        let writes = txn.into_writes();

        if !writes.is_empty() {
            // Persist first; the in-memory table only moves once the file has.
            let mut next = records.clone();
            apply_writes(&mut next, writes);
            self.persist(&next)?;
            *records = next;
        }
        Ok(result)
    }

    fn list(&self) -> StoreResult<Vec<Record>> {
        self.ensure_open()?;
        Ok(self.records.lock().values().cloned().collect())
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;
    use todosync_protocol::{RecordKey, RecordPatch};

    fn record(id: i64, title: &str) -> Record {
        Record::new(id, "c1", title, Utc.timestamp_opt(100, 0).unwrap())
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(&dir.path().join("replica.json")).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn committed_writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replica.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.transaction(|txn| txn.insert(record(1, "A"))).unwrap();
            store.transaction(|txn| txn.insert(record(2, "B"))).unwrap();
            store
                .transaction(|txn| {
                    let existing = txn.find(&RecordKey::new(1, "c1"))?.unwrap();
                    txn.update(&existing, &RecordPatch::fields(&record(1, "A2")))
                })
                .unwrap();
            store.transaction(|txn| txn.delete(&RecordKey::new(2, "c1"))).unwrap();
            store.close().unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.list().unwrap(), vec![record(1, "A2")]);
    }

    #[test]
    fn failed_transaction_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replica.json");
        let store = FileStore::open(&path).unwrap();
        store.transaction(|txn| txn.insert(record(1, "A"))).unwrap();

        let result = store.transaction(|txn| {
            txn.delete(&RecordKey::new(1, "c1"))?;
            txn.insert(record(1, "A"))?;
            txn.insert(record(1, "A"))
        });
        assert!(result.is_err());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.list().unwrap(), vec![record(1, "A")]);
        assert_eq!(store.list().unwrap(), vec![record(1, "A")]);
    }

    #[test]
    fn garbage_file_is_corrupted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replica.json");
        fs::write(&path, b"{ not a snapshot").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupted(_)));
    }

    #[test]
    fn duplicate_keys_are_corrupted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replica.json");
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            records: vec![record(1, "A"), record(1, "B")],
        };
        fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupted(_)));
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/replica.json");
        let store = FileStore::open_with_create_dirs(&path).unwrap();
        store.transaction(|txn| txn.insert(record(1, "A"))).unwrap();
        assert!(path.exists());
    }
}
