//! Write-set transaction over a committed record table.

use crate::error::{StoreError, StoreResult};
use crate::gateway::RecordTxn;
use std::collections::BTreeMap;
use todosync_protocol::{Record, RecordKey, RecordPatch};

/// Committed state of a store.
pub(crate) type RecordTable = BTreeMap<RecordKey, Record>;

/// Pending writes; `None` marks a deletion.
pub(crate) type WriteSet = BTreeMap<RecordKey, Option<Record>>;

/// A transaction that buffers writes on top of a read-only base table.
pub(crate) struct OverlayTxn<'a> {
    base: &'a RecordTable,
    writes: WriteSet,
}

impl<'a> OverlayTxn<'a> {
    pub(crate) fn new(base: &'a RecordTable) -> Self {
        Self {
            base,
            writes: WriteSet::new(),
        }
    }

    /// Consumes the transaction, returning its buffered writes.
    pub(crate) fn into_writes(self) -> WriteSet {
        self.writes
    }

    fn current(&self, key: &RecordKey) -> Option<&Record> {
        match self.writes.get(key) {
            Some(pending) => pending.as_ref(),
            None => self.base.get(key),
        }
    }
}

impl RecordTxn for OverlayTxn<'_> {
    fn find(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        Ok(self.current(key).cloned())
    }

    fn insert(&mut self, record: Record) -> StoreResult<Record> {
        let key = record.key();
        if self.current(&key).is_some() {
            return Err(StoreError::Duplicate { key });
        }
        self.writes.insert(key, Some(record.clone()));
        Ok(record)
    }

    fn update(&mut self, existing: &Record, patch: &RecordPatch) -> StoreResult<Record> {
        let key = existing.key();
        let mut record = self
            .current(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
        patch.apply_to(&mut record);
        self.writes.insert(key, Some(record.clone()));
        Ok(record)
    }

    fn delete(&mut self, key: &RecordKey) -> StoreResult<Option<Record>> {
        let removed = self.current(key).cloned();
        if removed.is_some() {
            self.writes.insert(key.clone(), None);
        }
        Ok(removed)
    }
}

/// Applies a committed write set to `table`.
pub(crate) fn apply_writes(table: &mut RecordTable, writes: WriteSet) {
    for (key, write) in writes {
        match write {
            Some(record) => {
                table.insert(key, record);
            }
            None => {
                table.remove(&key);
            }
        }
    }
}
