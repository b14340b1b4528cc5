//! Record store gateway definition.

use crate::error::StoreResult;
use todosync_protocol::{Record, RecordKey, RecordPatch};

/// A view of replica state inside one transaction.
///
/// Reads observe the transaction's own earlier writes. Nothing is visible to
/// other transactions until the enclosing [`RecordStore::transaction`] call
/// commits.
pub trait RecordTxn {
    /// Fetches the record stored under `key`.
    fn find(&self, key: &RecordKey) -> StoreResult<Option<Record>>;

    /// Inserts a new record and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the key is already taken.
    fn insert(&mut self, record: Record) -> StoreResult<Record>;

    /// Applies `patch` to the record identified by `existing` and returns the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the record no longer exists.
    fn update(&mut self, existing: &Record, patch: &RecordPatch) -> StoreResult<Record>;

    /// Removes the record stored under `key`, returning it if it existed.
    fn delete(&mut self, key: &RecordKey) -> StoreResult<Option<Record>>;
}

/// A transactional record store owned by one replica.
///
/// # Invariants
///
/// - `transaction` commits every write made by `f` if `f` returns `Ok`
/// - if `f` or the commit fails, no write is visible afterwards
/// - transactions on the same store do not interleave
/// - implementations must be `Send + Sync`
///
/// # Implementors
///
/// - [`crate::InMemoryStore`] - For testing
/// - [`crate::FileStore`] - For persistent replicas
pub trait RecordStore: Send + Sync {
    /// Runs `f` inside a transaction.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a commit error, after rolling back.
    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn RecordTxn) -> StoreResult<T>;

    /// Returns all records ordered by key.
    fn list(&self) -> StoreResult<Vec<Record>>;

    /// Flushes and closes the store. Later calls fail with `StoreError::Closed`.
    fn close(&self) -> StoreResult<()>;

    /// Fetches a single record in its own read-only transaction.
    fn find(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        self.transaction(|txn| txn.find(key))
    }

    /// Returns the number of stored records.
    fn len(&self) -> StoreResult<usize> {
        Ok(self.list()?.len())
    }

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}
