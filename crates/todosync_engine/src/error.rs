//! Error types for the sync engine.

use thiserror::Error;
use todosync_protocol::ProtocolError;
use todosync_store::StoreError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while consuming and resolving change events.
///
/// Conflicts are not errors; they are reported as a
/// [`Resolution`](crate::Resolution).
#[derive(Error, Debug)]
pub enum SyncError {
    /// The message could not be decoded or has an invalid operation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The store failed and the transaction was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether reconnecting may help.
        retryable: bool,
    },

    /// The transport never became reachable.
    #[error("transport not ready after {attempts} attempts")]
    BrokerUnavailable {
        /// Number of connection attempts made.
        attempts: u32,
    },

    /// Consumption was cancelled by the shutdown signal.
    #[error("consumption cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if reconnecting to the transport may clear this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns true if this error belongs to a single message rather than to
    /// the transport or the loop itself.
    ///
    /// A closed store is not a message error: the replica is shutting down.
    pub fn is_message_error(&self) -> bool {
        match self {
            SyncError::Storage(StoreError::Closed) => false,
            SyncError::Protocol(_) | SyncError::Storage(_) => true,
            _ => false,
        }
    }

    /// Returns true if the store was closed underneath the loop.
    pub fn is_store_closed(&self) -> bool {
        matches!(self, SyncError::Storage(StoreError::Closed))
    }
}
