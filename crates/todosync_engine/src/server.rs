//! Server-side conflict resolution.
//!
//! The server fans in every client's change feed and arbitrates updates by
//! last-write-wins on `updated_at`. Creates for a key the server already holds
//! with different content are refused, and deletes are always honored.

use crate::error::SyncResult;
use crate::strategy::{Resolution, ResolveStrategy};
use std::sync::Arc;
use todosync_protocol::{ChangeEnvelope, Record, RecordPatch};
use todosync_store::{RecordStore, RecordTxn, StoreResult};
use tracing::{debug, info, warn};

/// Resolves client events against the server replica.
pub struct ServerStrategy<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> ServerStrategy<S> {
    /// Creates a strategy writing to `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the replica's store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: RecordStore> ResolveStrategy for ServerStrategy<S> {
    fn name(&self) -> &'static str {
        "server"
    }

    fn handle_create(&self, event: &ChangeEnvelope) -> SyncResult<Resolution> {
        info!(id = event.key.id, client_id = %event.key.client_id, "CREATE request");
        debug!(after = ?event.after, "create image");
        let after = event.after_image()?;
        Ok(self.store.transaction(|txn| create_in(txn, event, after))?)
    }

    fn handle_update(&self, event: &ChangeEnvelope) -> SyncResult<Resolution> {
        info!(id = event.key.id, client_id = %event.key.client_id, "UPDATE request");
        debug!(before = ?event.before, after = ?event.after, "update images");
        let after = event.after_image()?;
        Ok(self.store.transaction(|txn| update_in(txn, event, after))?)
    }

    fn handle_delete(&self, event: &ChangeEnvelope) -> SyncResult<Resolution> {
        info!(id = event.key.id, client_id = %event.key.client_id, "DELETE request");
        debug!(before = ?event.before, "delete image");
        Ok(self.store.transaction(|txn| delete_in(txn, event))?)
    }
}

fn create_in(
    txn: &mut dyn RecordTxn,
    event: &ChangeEnvelope,
    after: &Record,
) -> StoreResult<Resolution> {
    match txn.find(&event.key)? {
        Some(existing) if existing == *after => {
            info!(id = event.key.id, client_id = %event.key.client_id, "already in sync, skipping");
            Ok(Resolution::Synced)
        }
        Some(_) => {
            warn!(
                id = event.key.id,
                client_id = %event.key.client_id,
                "conflict detected, record exists with different content, blocking create"
            );
            Ok(Resolution::Blocked)
        }
        None => {
            txn.insert(after.clone())?;
            info!(id = event.key.id, client_id = %event.key.client_id, "record created");
            Ok(Resolution::Created)
        }
    }
}

fn update_in(
    txn: &mut dyn RecordTxn,
    event: &ChangeEnvelope,
    after: &Record,
) -> StoreResult<Resolution> {
    let Some(existing) = txn.find(&event.key)? else {
        info!(
            id = event.key.id,
            client_id = %event.key.client_id,
            "record not found, resolving update as create"
        );
        return create_in(txn, event, after);
    };

    if existing == *after {
        info!(id = event.key.id, client_id = %event.key.client_id, "already in sync, skipping");
        return Ok(Resolution::Synced);
    }

    let conflict = !event.before_matches(&existing);
    if conflict {
        warn!(
            id = event.key.id,
            client_id = %event.key.client_id,
            "conflict detected, preimage differs from server record"
        );
    }

    if !after.is_newer_than(&existing) {
        info!(
            id = event.key.id,
            client_id = %event.key.client_id,
            stored_updated_at = %existing.updated_at,
            event_updated_at = %after.updated_at,
            "update is not newer than server record, skipping"
        );
        return Ok(Resolution::Stale { conflict });
    }

    txn.update(&existing, &RecordPatch::fields(after))?;
    info!(id = event.key.id, client_id = %event.key.client_id, conflict, "record updated");
    Ok(Resolution::Updated { conflict })
}

fn delete_in(txn: &mut dyn RecordTxn, event: &ChangeEnvelope) -> StoreResult<Resolution> {
    let Some(existing) = txn.find(&event.key)? else {
        info!(id = event.key.id, client_id = %event.key.client_id, "record already absent");
        return Ok(Resolution::AlreadyAbsent);
    };

    let conflict = !event.before_matches(&existing);
    if conflict {
        warn!(
            id = event.key.id,
            client_id = %event.key.client_id,
            "conflict detected, deleting diverged record anyway"
        );
    }

    txn.delete(&event.key)?;
    info!(id = event.key.id, client_id = %event.key.client_id, conflict, "record deleted");
    Ok(Resolution::Deleted { conflict })
}

#[cfg(test)]
mod tests {
    use super::*;
    use todosync_store::InMemoryStore;
    use todosync_testkit::{completed, retitled, store_with, todo, ts};

    fn strategy(store: &Arc<InMemoryStore>) -> ServerStrategy<InMemoryStore> {
        ServerStrategy::new(Arc::clone(store))
    }

    #[test]
    fn create_into_empty_store() {
        let store = Arc::new(InMemoryStore::new());
        let record = todo(1, "c1", "A", 10);

        let outcome = strategy(&store)
            .handle_create(&ChangeEnvelope::create(record.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Created);
        assert_eq!(store.snapshot(), vec![record]);
    }

    #[test]
    fn create_echo_is_synced() {
        let record = todo(1, "c1", "A", 10);
        let store = store_with([record.clone()]);

        let outcome = strategy(&store)
            .handle_create(&ChangeEnvelope::create(record))
            .unwrap();

        assert_eq!(outcome, Resolution::Synced);
    }

    #[test]
    fn conflicting_create_is_blocked_even_if_newer() {
        let stored = todo(1, "c1", "A", 10);
        let store = store_with([stored.clone()]);

        let outcome = strategy(&store)
            .handle_create(&ChangeEnvelope::create(retitled(&stored, "B", 99)))
            .unwrap();

        assert_eq!(outcome, Resolution::Blocked);
        assert_eq!(store.snapshot(), vec![stored]);
    }

    #[test]
    fn newer_linear_update_applies() {
        let stored = todo(1, "c1", "A", 10);
        let store = store_with([stored.clone()]);
        let after = completed(&stored, 20);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(stored, after.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Updated { conflict: false });
        assert_eq!(store.snapshot(), vec![after]);
    }

    #[test]
    fn stale_update_is_rejected() {
        let stored = todo(1, "c1", "A", 20);
        let store = store_with([stored.clone()]);
        let after = retitled(&stored, "old edit", 10);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(stored.clone(), after))
            .unwrap();

        assert_eq!(outcome, Resolution::Stale { conflict: false });
        assert_eq!(store.snapshot(), vec![stored]);
    }

    #[test]
    fn equal_timestamp_does_not_win() {
        let stored = todo(1, "c1", "A", 20);
        let store = store_with([stored.clone()]);
        let after = retitled(&stored, "tie", 20);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(stored.clone(), after))
            .unwrap();

        assert_eq!(outcome, Resolution::Stale { conflict: false });
        assert_eq!(store.snapshot(), vec![stored]);
    }

    #[test]
    fn conflicting_newer_update_still_wins() {
        let base = todo(1, "c1", "A", 10);
        let stored = retitled(&base, "other client", 20);
        let store = store_with([stored]);
        let after = retitled(&base, "latest", 30);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(base, after.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Updated { conflict: true });
        assert_eq!(store.snapshot(), vec![after]);
    }

    #[test]
    fn conflicting_older_update_is_skipped() {
        let base = todo(1, "c1", "A", 10);
        let stored = retitled(&base, "other client", 30);
        let store = store_with([stored.clone()]);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(base.clone(), retitled(&base, "B", 20)))
            .unwrap();

        assert_eq!(outcome, Resolution::Stale { conflict: true });
        assert_eq!(store.snapshot(), vec![stored]);
    }

    #[test]
    fn update_keeps_server_created_at() {
        let stored = todo(1, "c1", "A", 10);
        let store = store_with([stored.clone()]);
        let mut after = retitled(&stored, "B", 20);
        after.created_at = ts(1);

        strategy(&store)
            .handle_update(&ChangeEnvelope::update(stored.clone(), after))
            .unwrap();

        let record = store.snapshot().remove(0);
        assert_eq!(record.title, "B");
        assert_eq!(record.created_at, stored.created_at);
        assert_eq!(record.updated_at, ts(20));
    }

    #[test]
    fn update_of_missing_record_creates_it() {
        let store = Arc::new(InMemoryStore::new());
        let before = todo(1, "c1", "A", 10);
        let after = retitled(&before, "B", 20);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(before, after.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Created);
        assert_eq!(store.snapshot(), vec![after]);
    }

    #[test]
    fn update_echo_is_synced() {
        let before = todo(1, "c1", "A", 10);
        let after = retitled(&before, "B", 20);
        let store = store_with([after.clone()]);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(before, after))
            .unwrap();

        assert_eq!(outcome, Resolution::Synced);
    }

    #[test]
    fn matching_delete_removes_record() {
        let stored = todo(1, "c1", "A", 10);
        let store = store_with([stored.clone()]);

        let outcome = strategy(&store)
            .handle_delete(&ChangeEnvelope::delete(stored))
            .unwrap();

        assert_eq!(outcome, Resolution::Deleted { conflict: false });
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn diverged_delete_still_deletes() {
        let base = todo(1, "c1", "A", 10);
        let store = store_with([completed(&base, 40)]);

        let outcome = strategy(&store)
            .handle_delete(&ChangeEnvelope::delete(base))
            .unwrap();

        assert_eq!(outcome, Resolution::Deleted { conflict: true });
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn delete_of_missing_record_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let outcome = strategy(&store)
            .handle_delete(&ChangeEnvelope::delete(todo(1, "c1", "A", 10)))
            .unwrap();
        assert_eq!(outcome, Resolution::AlreadyAbsent);
    }

    #[test]
    fn closed_store_surfaces_storage_error() {
        let store = Arc::new(InMemoryStore::new());
        store.close().unwrap();

        let err = strategy(&store)
            .handle_create(&ChangeEnvelope::create(todo(1, "c1", "A", 10)))
            .unwrap_err();

        assert!(matches!(err, crate::SyncError::Storage(_)));
    }
}
