//! The synchronized todo record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite identity of a record.
///
/// Every client numbers its records independently, so the numeric id alone
/// is not unique across replicas; the owning client id disambiguates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Per-client record number.
    pub id: i64,
    /// Client that originally created the record.
    pub client_id: String,
}

impl RecordKey {
    /// Creates a new key.
    pub fn new(id: i64, client_id: impl Into<String>) -> Self {
        Self {
            id,
            client_id: client_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.id, self.client_id)
    }
}

/// A todo record as stored on every replica and carried in change events.
///
/// Equality is field-wise, timestamps included. Two replicas holding equal
/// records are in sync for that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Per-client record number.
    pub id: i64,
    /// Owning client.
    pub client_id: String,
    /// Title of the todo.
    pub title: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the todo is done.
    #[serde(default)]
    pub completed: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation, assigned by whichever side performed it.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Creates a record with `created_at == updated_at == at`.
    pub fn new(
        id: i64,
        client_id: impl Into<String>,
        title: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            client_id: client_id.into(),
            title: title.into(),
            description: None,
            completed: false,
            created_at: at,
            updated_at: at,
        }
    }

    /// Returns the composite key of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.id, self.client_id.clone())
    }

    /// Returns true if `(id, client_id)` equals `key`.
    pub fn has_key(&self, key: &RecordKey) -> bool {
        self.id == key.id && self.client_id == key.client_id
    }

    /// Returns true if this record was modified strictly after `other`.
    pub fn is_newer_than(&self, other: &Record) -> bool {
        self.updated_at > other.updated_at
    }
}

/// The field set written when an existing record is updated.
///
/// The server keeps its own `created_at` and only takes the mutable fields;
/// a client mirrors the server's copy completely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPatch {
    /// New title.
    pub title: String,
    /// New description.
    pub description: Option<String>,
    /// New completion flag.
    pub completed: bool,
    /// Replacement creation time, if the patch carries one.
    pub created_at: Option<DateTime<Utc>>,
    /// New modification time.
    pub updated_at: DateTime<Utc>,
}

impl RecordPatch {
    /// Mutable fields of `record`, leaving `created_at` untouched.
    pub fn fields(record: &Record) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            completed: record.completed,
            created_at: None,
            updated_at: record.updated_at,
        }
    }

    /// Every non-key field of `record`, so the target becomes equal to it.
    pub fn sync(record: &Record) -> Self {
        Self {
            created_at: Some(record.created_at),
            ..Self::fields(record)
        }
    }

    /// Writes the patch into `record`.
    pub fn apply_to(&self, record: &mut Record) {
        record.title.clone_from(&self.title);
        record.description.clone_from(&self.description);
        record.completed = self.completed;
        if let Some(created_at) = self.created_at {
            record.created_at = created_at;
        }
        record.updated_at = self.updated_at;
    }
}
