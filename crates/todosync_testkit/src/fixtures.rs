//! Test fixtures and replica helpers.
//!
//! Timestamps are expressed as seconds after a fixed epoch so tests can
//! reason about "older" and "newer" with plain integers.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use todosync_protocol::{ChangeEnvelope, RawMessage, Record};
use todosync_store::InMemoryStore;

/// Returns the fixed fixture epoch, 2024-01-01T00:00:00Z.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("fixture epoch is a valid date")
}

/// Returns the time `secs` seconds after the fixture epoch.
pub fn ts(secs: i64) -> DateTime<Utc> {
    epoch() + Duration::seconds(secs)
}

/// Creates an open todo created and last modified at `ts(secs)`.
pub fn todo(id: i64, client_id: &str, title: &str, secs: i64) -> Record {
    Record::new(id, client_id, title, ts(secs))
}

/// Returns `record` with a new title, modified at `ts(secs)`.
pub fn retitled(record: &Record, title: &str, secs: i64) -> Record {
    let mut edited = record.clone();
    edited.title = title.to_string();
    edited.updated_at = ts(secs);
    edited
}

/// Returns `record` marked completed, modified at `ts(secs)`.
pub fn completed(record: &Record, secs: i64) -> Record {
    let mut edited = record.clone();
    edited.completed = true;
    edited.updated_at = ts(secs);
    edited
}

/// Creates an in-memory store holding `records`.
pub fn store_with(records: impl IntoIterator<Item = Record>) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::with_records(records))
}

/// Encodes `envelope` as a transport message on `topic`.
pub fn message(topic: &str, envelope: &ChangeEnvelope) -> RawMessage {
    envelope
        .to_message(topic)
        .expect("fixture envelopes always encode")
}

/// Builds a transport message from literal key and value JSON documents.
pub fn raw_message(topic: &str, key_json: &str, value_json: &str) -> RawMessage {
    RawMessage::new(topic, key_json.as_bytes().to_vec(), value_json.as_bytes().to_vec())
}

/// Returns the key document for `(id, client_id)`.
pub fn key_json(id: i64, client_id: &str) -> String {
    serde_json::json!({ "payload": { "id": id, "client_id": client_id } }).to_string()
}
