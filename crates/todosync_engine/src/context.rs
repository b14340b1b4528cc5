//! Per-replica lifecycle.

use crate::client::ClientStrategy;
use crate::config::ConsumerConfig;
use crate::consumer::Consumer;
use crate::error::SyncResult;
use crate::handler::Handler;
use crate::server::ServerStrategy;
use crate::shutdown::ShutdownSignal;
use crate::transport::MessageSource;
use std::fmt;
use std::sync::Arc;
use todosync_store::RecordStore;
use tracing::info;

/// Which side of the sync a replica plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    /// Consumes the server's feed; the server has authority.
    Client,
    /// Consumes every client's feed; last write wins.
    Server,
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaRole::Client => write!(f, "client"),
            ReplicaRole::Server => write!(f, "server"),
        }
    }
}

/// Everything one replica needs: its store, its resolution strategy and the
/// signal that stops its loops.
///
/// A context is opened explicitly and closed explicitly; closing stops every
/// consumer created from it and closes the store.
pub struct ReplicaContext<S: RecordStore + 'static> {
    role: ReplicaRole,
    store: Arc<S>,
    handler: Handler,
    shutdown: ShutdownSignal,
}

impl<S: RecordStore + 'static> ReplicaContext<S> {
    /// Opens a replica of `role` over `store`.
    pub fn open(role: ReplicaRole, store: Arc<S>) -> Self {
        let handler = match role {
            ReplicaRole::Client => Handler::new(ClientStrategy::new(Arc::clone(&store))),
            ReplicaRole::Server => Handler::new(ServerStrategy::new(Arc::clone(&store))),
        };
        info!(role = %role, "replica opened");
        Self {
            role,
            store,
            handler,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Returns the replica's role.
    pub fn role(&self) -> ReplicaRole {
        self.role
    }

    /// Returns the replica's store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the replica's handler.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Returns the replica's shutdown signal.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Creates a consumption loop for this replica.
    pub fn consumer<T: MessageSource>(&self, transport: T, config: ConsumerConfig) -> Consumer<T> {
        Consumer::new(transport, self.handler.clone(), config, self.shutdown.clone())
    }

    /// Stops all loops and closes the store.
    pub fn close(self) -> SyncResult<()> {
        self.shutdown.trigger();
        self.store.close()?;
        info!(role = %self.role, "replica closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Resolution;
    use todosync_protocol::ChangeEnvelope;
    use todosync_store::{InMemoryStore, StoreError};
    use todosync_testkit::{completed, store_with, todo};

    #[test]
    fn role_selects_strategy() {
        let base = todo(1, "c1", "A", 10);
        let diverged = ChangeEnvelope::delete(base.clone());

        let client = ReplicaContext::open(ReplicaRole::Client, store_with([completed(&base, 20)]));
        assert_eq!(client.handler().strategy_name(), "client");
        assert_eq!(client.handler().dispatch(&diverged).unwrap(), Resolution::Blocked);

        let server = ReplicaContext::open(ReplicaRole::Server, store_with([completed(&base, 20)]));
        assert_eq!(server.role(), ReplicaRole::Server);
        assert_eq!(
            server.handler().dispatch(&diverged).unwrap(),
            Resolution::Deleted { conflict: true }
        );
    }

    #[test]
    fn close_stops_loops_and_store() {
        let context = ReplicaContext::open(ReplicaRole::Client, Arc::new(InMemoryStore::new()));
        let signal = context.shutdown_signal().clone();
        let store = Arc::clone(context.store());

        context.close().unwrap();

        assert!(signal.is_triggered());
        assert!(matches!(store.list(), Err(StoreError::Closed)));
    }

    #[test]
    fn role_display() {
        assert_eq!(ReplicaRole::Client.to_string(), "client");
        assert_eq!(ReplicaRole::Server.to_string(), "server");
    }
}
