//! Client-side conflict resolution.
//!
//! A client consumes the server's change feed. The server is authoritative
//! for creates and updates, so a diverging local record is overwritten. A
//! delete is only honored if its preimage still matches local state, which
//! protects local edits the server has not seen yet.

use crate::error::SyncResult;
use crate::strategy::{Resolution, ResolveStrategy};
use std::sync::Arc;
use todosync_protocol::{ChangeEnvelope, Record, RecordPatch};
use todosync_store::{RecordStore, RecordTxn, StoreResult};
use tracing::{debug, info, warn};

/// Resolves server events against a client replica.
pub struct ClientStrategy<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> ClientStrategy<S> {
    /// Creates a strategy writing to `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the replica's store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: RecordStore> ResolveStrategy for ClientStrategy<S> {
    fn name(&self) -> &'static str {
        "client"
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
    let Some(local) = txn.find(&event.key)? else {
        txn.insert(after.clone())?;
        info!(id = event.key.id, client_id = %event.key.client_id, "record created");
        return Ok(Resolution::Created);
    };

    if *after == local {
        info!(id = event.key.id, client_id = %event.key.client_id, "already in sync, skipping");
        return Ok(Resolution::Synced);
    }

    if after.is_newer_than(&local) {
        info!(
            id = event.key.id,
            client_id = %event.key.client_id,
            "newer create, resolving as update"
        );
        return update_in(txn, event, after);
    }

    warn!(
        id = event.key.id,
        client_id = %event.key.client_id,
        local_updated_at = %local.updated_at,
        event_updated_at = %after.updated_at,
        "conflicting create is not newer than local record, ignoring"
    );
    Ok(Resolution::Stale { conflict: true })
}

fn update_in(
    txn: &mut dyn RecordTxn,
    event: &ChangeEnvelope,
    after: &Record,
) -> StoreResult<Resolution> {
    let Some(local) = txn.find(&event.key)? else {
        txn.insert(after.clone())?;
        info!(
            id = event.key.id,
            client_id = %event.key.client_id,
            "record missing locally, created from server state"
        );
        return Ok(Resolution::Created);
    };

    if *after == local {
        info!(id = event.key.id, client_id = %event.key.client_id, "already in sync, skipping");
        return Ok(Resolution::Synced);
    }

    let conflict = !event.before_matches(&local);
    if conflict {
        warn!(
            id = event.key.id,
            client_id = %event.key.client_id,
            "conflict detected, server has authority, overwriting local record"
        );
    }

    txn.update(&local, &RecordPatch::sync(after))?;
    info!(id = event.key.id, client_id = %event.key.client_id, conflict, "record updated");
    Ok(Resolution::Updated { conflict })
}

fn delete_in(txn: &mut dyn RecordTxn, event: &ChangeEnvelope) -> StoreResult<Resolution> {
    let Some(local) = txn.find(&event.key)? else {
        info!(id = event.key.id, client_id = %event.key.client_id, "record already absent");
        return Ok(Resolution::AlreadyAbsent);
    };

    if !event.before_matches(&local) {
        warn!(
            id = event.key.id,
            client_id = %event.key.client_id,
            "conflict detected, local record changed, blocking delete"
        );
        return Ok(Resolution::Blocked);
    }

    txn.delete(&event.key)?;
    info!(id = event.key.id, client_id = %event.key.client_id, "record deleted");
    Ok(Resolution::Deleted { conflict: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use todosync_store::{InMemoryStore, StoreError};
    use todosync_testkit::{completed, retitled, store_with, todo};

    fn strategy(store: &Arc<InMemoryStore>) -> ClientStrategy<InMemoryStore> {
        ClientStrategy::new(Arc::clone(store))
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
            .handle_create(&ChangeEnvelope::create(record.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Synced);
        assert_eq!(store.snapshot(), vec![record]);
    }

    #[test]
    fn newer_create_overwrites_local() {
        let local = todo(1, "c1", "A", 10);
        let store = store_with([local.clone()]);
        let server = retitled(&local, "B", 20);

        let outcome = strategy(&store)
            .handle_create(&ChangeEnvelope::create(server.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Updated { conflict: true });
        assert_eq!(store.snapshot(), vec![server]);
    }

    #[test]
    fn older_create_is_ignored() {
        let local = todo(1, "c1", "A", 20);
        let store = store_with([local.clone()]);
        let server = retitled(&local, "B", 10);

        let outcome = strategy(&store)
            .handle_create(&ChangeEnvelope::create(server))
            .unwrap();

        assert_eq!(outcome, Resolution::Stale { conflict: true });
        assert_eq!(store.snapshot(), vec![local]);
    }

    #[test]
    fn linear_update_applies() {
        let local = todo(1, "c1", "A", 10);
        let store = store_with([local.clone()]);
        let after = completed(&local, 20);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(local, after.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Updated { conflict: false });
        assert_eq!(store.snapshot(), vec![after]);
    }

    #[test]
    fn update_echo_is_synced() {
        let before = todo(1, "c1", "A", 10);
        let after = retitled(&before, "B", 20);
        let store = store_with([after.clone()]);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(before, after.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Synced);
        assert_eq!(store.snapshot(), vec![after]);
    }

    #[test]
    fn server_has_authority_over_diverged_record() {
        let base = todo(1, "c1", "A", 10);
        let local = retitled(&base, "local edit", 50);
        let store = store_with([local]);
        let server = retitled(&base, "server edit", 20);

        let outcome = strategy(&store)
            .handle_update(&ChangeEnvelope::update(base, server.clone()))
            .unwrap();

        assert_eq!(outcome, Resolution::Updated { conflict: true });
        assert_eq!(store.snapshot(), vec![server]);
    }

    #[test]
    fn update_mirrors_created_at() {
        let local = todo(1, "c1", "A", 10);
        let store = store_with([local.clone()]);
        let mut after = retitled(&local, "B", 20);
        after.created_at = todosync_testkit::ts(5);

        strategy(&store)
            .handle_update(&ChangeEnvelope::update(local, after.clone()))
            .unwrap();

        assert_eq!(store.snapshot(), vec![after]);
    }

    #[test]
    fn update_of_missing_record_inserts_it() {
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
    fn matching_delete_removes_record() {
        let local = todo(1, "c1", "A", 10);
        let store = store_with([local.clone()]);

        let outcome = strategy(&store)
            .handle_delete(&ChangeEnvelope::delete(local))
            .unwrap();

        assert_eq!(outcome, Resolution::Deleted { conflict: false });
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn delete_of_edited_record_is_blocked() {
        let base = todo(1, "c1", "A", 10);
        let local = completed(&base, 30);
        let store = store_with([local.clone()]);

        let outcome = strategy(&store)
            .handle_delete(&ChangeEnvelope::delete(base))
            .unwrap();

        assert_eq!(outcome, Resolution::Blocked);
        assert_eq!(store.snapshot(), vec![local]);
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
    fn failed_commit_leaves_store_untouched() {
        let local = todo(1, "c1", "A", 10);
        let store = store_with([local.clone()]);
        store.fail_next_commits(1);

        let err = strategy(&store)
            .handle_update(&ChangeEnvelope::update(local.clone(), retitled(&local, "B", 20)))
            .unwrap_err();

        assert!(matches!(
            err,
            crate::SyncError::Storage(StoreError::CommitFailed(_))
        ));
        assert_eq!(store.snapshot(), vec![local]);
    }
}
