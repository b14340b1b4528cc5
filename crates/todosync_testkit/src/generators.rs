//! Property-based test generators using proptest.

use crate::fixtures::ts;
use proptest::prelude::*;
use todosync_protocol::Record;

/// Strategy for timestamps within a small window, so collisions happen.
pub fn timestamp_secs_strategy() -> impl Strategy<Value = i64> {
    0i64..200
}

/// Strategy for short titles.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for versions of one record: arbitrary title, description,
/// completion flag and `updated_at`, with key and `created_at` fixed.
pub fn record_version_strategy(id: i64, client_id: &'static str) -> impl Strategy<Value = Record> {
    (
        title_strategy(),
        prop::option::of(title_strategy()),
        any::<bool>(),
        timestamp_secs_strategy(),
    )
        .prop_map(move |(title, description, completed, secs)| Record {
            id,
            client_id: client_id.to_string(),
            title,
            description,
            completed,
            created_at: ts(0),
            updated_at: ts(secs),
        })
}

/// Strategy for a sequence of `1..max_len` versions of the same record.
pub fn version_history_strategy(
    id: i64,
    client_id: &'static str,
    max_len: usize,
) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(record_version_strategy(id, client_id), 1..max_len)
}
