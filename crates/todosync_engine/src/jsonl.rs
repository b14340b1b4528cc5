//! A [`MessageSource`] backed by a recorded JSON-lines log.
//!
//! Each non-blank line holds one message:
//!
//! ```text
//! {"topic": "client-1-topic.public.todos", "key": {...}, "value": {...}}
//! ```
//!
//! `key` and `value` are the JSON documents the connector would have
//! produced; a `null` (or missing) value is a tombstone.

use crate::error::{SyncError, SyncResult};
use crate::transport::{MessageSource, PollEvent};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;
use todosync_protocol::RawMessage;

#[derive(Debug, Deserialize)]
struct LogLine {
    topic: String,
    #[serde(default)]
    key: Option<serde_json::Value>,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

/// Replays a recorded log in file order.
///
/// Offsets are assigned per topic in the order lines appear. After the last
/// subscribed message, one end-of-partition event is emitted per subscribed
/// topic, after which polling returns `None`. The log is always reachable and
/// commits are accepted but not persisted.
#[derive(Debug)]
pub struct JsonLinesSource {
    messages: Vec<RawMessage>,
    pending: VecDeque<RawMessage>,
    subscriptions: Vec<String>,
    ends: VecDeque<String>,
    committed: u64,
}

impl JsonLinesSource {
    /// Parses a log from `reader`.
    ///
    /// # Errors
    ///
    /// Returns a non-retryable transport error naming the first malformed
    /// line.
    pub fn from_reader(reader: impl BufRead) -> SyncResult<Self> {
        let mut offsets: BTreeMap<String, u64> = BTreeMap::new();
        let mut messages = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| {
                SyncError::transport_fatal(format!("failed to read line {line_no}: {e}"))
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let parsed: LogLine = serde_json::from_str(&line).map_err(|e| {
                SyncError::transport_fatal(format!("malformed log line {line_no}: {e}"))
            })?;
            let offset = offsets.entry(parsed.topic.clone()).or_insert(0);
            messages.push(RawMessage {
                topic: parsed.topic,
                offset: *offset,
                key: document_bytes(parsed.key)?,
                value: document_bytes(parsed.value)?,
            });
            *offset += 1;
        }

        Ok(Self {
            messages,
            pending: VecDeque::new(),
            subscriptions: Vec::new(),
            ends: VecDeque::new(),
            committed: 0,
        })
    }

    /// Opens and parses the log at `path`.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let file = File::open(path).map_err(|e| {
            SyncError::transport_fatal(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Returns every message in the log, in file order.
    pub fn messages(&self) -> &[RawMessage] {
        &self.messages
    }

    /// Returns how many messages have been committed.
    pub fn committed(&self) -> u64 {
        self.committed
    }
}

fn document_bytes(document: Option<serde_json::Value>) -> SyncResult<Option<Vec<u8>>> {
    match document {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(doc) => serde_json::to_vec(&doc)
            .map(Some)
            .map_err(|e| SyncError::transport_fatal(e.to_string())),
    }
}

impl MessageSource for JsonLinesSource {
    fn connect(&mut self, _group_id: &str) -> SyncResult<()> {
        Ok(())
    }

    fn topics(&self) -> SyncResult<BTreeSet<String>> {
        Ok(self.messages.iter().map(|m| m.topic.clone()).collect())
    }

    fn subscribe(&mut self, topics: &[String]) -> SyncResult<()> {
        self.subscriptions = topics.to_vec();
        self.pending = self
            .messages
            .iter()
            .filter(|m| topics.contains(&m.topic))
            .cloned()
            .collect();
        self.ends = topics.iter().cloned().collect();
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> SyncResult<Option<PollEvent>> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(PollEvent::Message(message)));
        }
        Ok(self
            .ends
            .pop_front()
            .map(|topic| PollEvent::EndOfPartition { topic }))
    }

    fn commit(&mut self, _message: &RawMessage) -> SyncResult<()> {
        self.committed += 1;
        Ok(())
    }

    fn close(&mut self) -> SyncResult<()> {
        self.pending.clear();
        self.ends.clear();
        Ok(())
    }
}
