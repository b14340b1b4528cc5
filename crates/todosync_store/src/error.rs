//! Error types for store operations.

use std::io;
use thiserror::Error;
use todosync_protocol::RecordKey;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// Any error returned from inside a transaction rolls the transaction back.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Records could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted state is not a valid snapshot.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// An update targeted a record that does not exist.
    #[error("record {key} not found")]
    NotFound {
        /// Key of the missing record.
        key: RecordKey,
    },

    /// An insert targeted a key that is already taken.
    #[error("record {key} already exists")]
    Duplicate {
        /// Key of the existing record.
        key: RecordKey,
    },

    /// The transaction could not be committed.
    #[error("commit failed: {0}")]
    CommitFailed(String),
}
