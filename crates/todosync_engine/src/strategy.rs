//! The conflict-resolution capability set.

use crate::error::SyncResult;
use todosync_protocol::ChangeEnvelope;

/// Outcome of resolving one change event against local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The event redescribes stored state; nothing was written.
    Synced,
    /// A new record was inserted.
    Created,
    /// The stored record was overwritten with the event's `after` image.
    Updated {
        /// Stored state differed from the event's `before` image.
        conflict: bool,
    },
    /// The stored record was removed.
    Deleted {
        /// Stored state differed from the event's `before` image.
        conflict: bool,
    },
    /// The event was older than stored state and was dropped.
    Stale {
        /// Stored state differed from the event's `before` image.
        conflict: bool,
    },
    /// A conflicting event was refused; stored state is unchanged.
    Blocked,
    /// The record to delete was already gone.
    AlreadyAbsent,
}

impl Resolution {
    /// Returns true if resolving the event involved a conflict.
    pub fn is_conflict(&self) -> bool {
        match self {
            Resolution::Updated { conflict }
            | Resolution::Deleted { conflict }
            | Resolution::Stale { conflict } => *conflict,
            Resolution::Blocked => true,
            Resolution::Synced | Resolution::Created | Resolution::AlreadyAbsent => false,
        }
    }

    /// Returns true if the event changed stored state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Resolution::Created | Resolution::Updated { .. } | Resolution::Deleted { .. }
        )
    }
}

/// Decides how an incoming change event is applied to a replica.
///
/// Each method resolves the event inside a single store transaction: either
/// every write of the resolution is committed or none is. Implementations
/// exist for the client side ([`crate::ClientStrategy`]) and the server side
/// ([`crate::ServerStrategy`]); other policies can be plugged into the
/// [`crate::Handler`] the same way.
pub trait ResolveStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Resolves a CREATE event.
    fn handle_create(&self, event: &ChangeEnvelope) -> SyncResult<Resolution>;

    /// Resolves an UPDATE event.
    fn handle_update(&self, event: &ChangeEnvelope) -> SyncResult<Resolution>;

    /// Resolves a DELETE event.
    fn handle_delete(&self, event: &ChangeEnvelope) -> SyncResult<Resolution>;
}
