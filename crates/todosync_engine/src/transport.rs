//! Transport layer abstraction for the change stream.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use todosync_protocol::{ChangeEnvelope, RawMessage};

/// One result of polling a [`MessageSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A message, possibly a tombstone.
    Message(RawMessage),
    /// The consumer has read everything currently in `topic`.
    EndOfPartition {
        /// Topic that was read to its end.
        topic: String,
    },
}

/// A consumer-group view of a partitioned message log.
///
/// This trait abstracts the broker, allowing for different implementations
/// (a Kafka client, a recorded log file, an in-memory broker for testing).
///
/// Errors marked retryable (see [`SyncError::is_retryable`]) mean the
/// connection was lost; the caller reconnects and resumes from the last
/// committed offsets.
pub trait MessageSource: Send {
    /// Connects to the broker as a member of `group_id`.
    fn connect(&mut self, group_id: &str) -> SyncResult<()>;

    /// Returns the topics that currently exist.
    fn topics(&self) -> SyncResult<BTreeSet<String>>;

    /// Replaces the subscription with `topics`.
    fn subscribe(&mut self, topics: &[String]) -> SyncResult<()>;

    /// Fetches the next event, waiting at most `timeout`.
    fn poll(&mut self, timeout: Duration) -> SyncResult<Option<PollEvent>>;

    /// Marks `message` and everything before it in its topic as consumed.
    fn commit(&mut self, message: &RawMessage) -> SyncResult<()>;

    /// Leaves the group and closes the connection.
    fn close(&mut self) -> SyncResult<()>;
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: BTreeMap<String, Vec<RawMessage>>,
    committed: BTreeMap<(String, String), u64>,
    failing_connects: u32,
    failing_polls: u32,
}

#[derive(Debug)]
struct Session {
    group_id: String,
    subscriptions: Vec<String>,
    positions: BTreeMap<String, u64>,
    at_end: BTreeSet<String>,
    next_topic: usize,
}

/// An in-memory broker for tests and local replay.
///
/// Clones share the same log and fault-injection state but also the same
/// session; use [`MemoryTransport::handle`] to get an independent consumer
/// of the same log. Offsets are committed per consumer group, and a new
/// session resumes from them, so uncommitted messages are redelivered after
/// a reconnect. A poll that finds nothing to deliver sleeps for its timeout.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    broker: Arc<Mutex<BrokerState>>,
    session: Arc<Mutex<Option<Session>>>,
}

impl MemoryTransport {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a disconnected consumer handle on the same log.
    pub fn handle(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            session: Arc::default(),
        }
    }

    /// Creates `topic` if it does not exist yet.
    pub fn create_topic(&self, topic: &str) {
        self.broker.lock().topics.entry(topic.to_string()).or_default();
    }

    /// Appends `message` to its topic and returns the assigned offset.
    pub fn publish(&self, message: RawMessage) -> u64 {
        let mut broker = self.broker.lock();
        let log = broker.topics.entry(message.topic.clone()).or_default();
        let offset = log.len() as u64;
        log.push(message.with_offset(offset));
        offset
    }

    /// Encodes `event` and appends it to `topic`.
    pub fn publish_envelope(&self, topic: &str, event: &ChangeEnvelope) -> SyncResult<u64> {
        Ok(self.publish(event.to_message(topic)?))
    }

    /// Appends a tombstone for the key of `event` to `topic`.
    pub fn publish_tombstone(&self, topic: &str, event: &ChangeEnvelope) -> SyncResult<u64> {
        Ok(self.publish(RawMessage::tombstone(topic, event.encode_key()?)))
    }

    /// Returns the number of messages in `topic`.
    pub fn topic_len(&self, topic: &str) -> usize {
        self.broker.lock().topics.get(topic).map_or(0, Vec::len)
    }

    /// Returns the next offset `group_id` will read from `topic`.
    pub fn committed_offset(&self, group_id: &str, topic: &str) -> Option<u64> {
        self.broker
            .lock()
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
    }

    /// Makes the next `count` connection attempts fail with a retryable error.
    pub fn fail_next_connects(&self, count: u32) {
        self.broker.lock().failing_connects = count;
    }

    /// Makes the next `count` polls drop the connection.
    pub fn fail_next_polls(&self, count: u32) {
        self.broker.lock().failing_polls = count;
    }

    /// Returns true while this handle holds a session.
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Returns the topics this handle is subscribed to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.subscriptions.clone())
            .unwrap_or_default()
    }

    fn next_event(&mut self) -> SyncResult<Option<PollEvent>> {
        let mut broker = self.broker.lock();
        let mut guard = self.session.lock();
        if guard.is_none() {
            return Err(not_connected());
        }

        if broker.failing_polls > 0 {
            broker.failing_polls -= 1;
            *guard = None;
            return Err(SyncError::transport_retryable("connection lost"));
        }

        let Some(session) = guard.as_mut() else {
            return Err(not_connected());
        };
        let count = session.subscriptions.len();

        for step in 0..count {
            let index = (session.next_topic + step) % count;
            let topic = &session.subscriptions[index];
            let position = session.positions.get(topic).copied().unwrap_or(0);
            let Some(message) = broker
                .topics
                .get(topic)
                .and_then(|log| log.get(position as usize))
            else {
                continue;
            };

            let message = message.clone();
            session.positions.insert(topic.clone(), position + 1);
            session.at_end.remove(&message.topic);
            session.next_topic = (index + 1) % count;
            return Ok(Some(PollEvent::Message(message)));
        }

        let reached = session
            .subscriptions
            .iter()
            .find(|topic| !session.at_end.contains(*topic))
            .cloned();
        Ok(reached.map(|topic| {
            session.at_end.insert(topic.clone());
            PollEvent::EndOfPartition { topic }
        }))
    }
}

fn not_connected() -> SyncError {
    SyncError::transport_retryable("not connected")
}

impl MessageSource for MemoryTransport {
    fn connect(&mut self, group_id: &str) -> SyncResult<()> {
        {
            let mut broker = self.broker.lock();
            if broker.failing_connects > 0 {
                broker.failing_connects -= 1;
                return Err(SyncError::transport_retryable("broker not reachable"));
            }
        }

        *self.session.lock() = Some(Session {
            group_id: group_id.to_string(),
            subscriptions: Vec::new(),
            positions: BTreeMap::new(),
            at_end: BTreeSet::new(),
            next_topic: 0,
        });
        Ok(())
    }

    fn topics(&self) -> SyncResult<BTreeSet<String>> {
        if !self.is_connected() {
            return Err(not_connected());
        }
        Ok(self.broker.lock().topics.keys().cloned().collect())
    }

    fn subscribe(&mut self, topics: &[String]) -> SyncResult<()> {
        let broker = self.broker.lock();
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or_else(not_connected)?;

        session.subscriptions = topics.to_vec();
        session.positions.retain(|topic, _| topics.contains(topic));
        session.at_end.retain(|topic| topics.contains(topic));
        for topic in topics {
            if !session.positions.contains_key(topic) {
                let committed = broker
                    .committed
                    .get(&(session.group_id.clone(), topic.clone()))
                    .copied()
                    .unwrap_or(0);
                session.positions.insert(topic.clone(), committed);
            }
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> SyncResult<Option<PollEvent>> {
        let event = self.next_event()?;
        if event.is_none() && !timeout.is_zero() {
            thread::sleep(timeout);
        }
        Ok(event)
    }

    fn commit(&mut self, message: &RawMessage) -> SyncResult<()> {
        let group_id = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.group_id.clone())
            .ok_or_else(not_connected)?;

        let mut broker = self.broker.lock();
        let next = broker
            .committed
            .entry((group_id, message.topic.clone()))
            .or_insert(0);
        *next = (*next).max(message.offset + 1);
        Ok(())
    }

    fn close(&mut self) -> SyncResult<()> {
        *self.session.lock() = None;
        Ok(())
    }
}
