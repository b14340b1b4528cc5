//! In-memory record store for testing.

use crate::error::{StoreError, StoreResult};
use crate::gateway::{RecordStore, RecordTxn};
use crate::overlay::{apply_writes, OverlayTxn, RecordTable};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use todosync_protocol::Record;

/// An in-memory record store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral replicas that don't need persistence
///
/// Commits can be made to fail on purpose with
/// [`InMemoryStore::fail_next_commits`] to exercise rollback paths.
///
/// # Example
///
/// ```rust
/// use todosync_store::{InMemoryStore, RecordStore};
///
/// let store = InMemoryStore::new();
/// assert!(store.is_empty().unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<RecordTable>,
    closed: AtomicBool,
    failing_commits: AtomicU32,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let table = records.into_iter().map(|r| (r.key(), r)).collect();
        Self {
            records: Mutex::new(table),
            ..Self::default()
        }
    }

    /// Makes the next `count` writing commits fail with
    /// `StoreError::CommitFailed`.
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Returns a copy of all records ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.lock().values().cloned().collect()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn take_injected_failure(&self) -> StoreResult<()> {
        let armed = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            Err(StoreError::CommitFailed("injected commit failure".into()))
        } else {
            Ok(())
        }
    }
}

impl RecordStore for InMemoryStore {
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
            self.take_injected_failure()?;
            apply_writes(&mut records, writes);
        }
        Ok(result)
    }

    fn list(&self) -> StoreResult<Vec<Record>> {
        self.ensure_open()?;
        Ok(self.snapshot())
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
