//! The sequential consumption loop.
//!
//! One message is decoded, resolved and committed before the next one is
//! polled. Transport failures end the current session and, after a
//! cancellable delay, a new one resumes from the last committed offsets.

use crate::config::{ConsumerConfig, MessageErrorPolicy};
use crate::error::{SyncError, SyncResult};
use crate::handler::Handler;
use crate::shutdown::ShutdownSignal;
use crate::transport::{MessageSource, PollEvent};
use std::collections::BTreeSet;
use todosync_protocol::RawMessage;
use tracing::{debug, error, info, warn};

/// Statistics about a consumption run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    /// Messages with a value that were handed to the handler.
    pub messages: u64,
    /// Messages whose resolution changed stored state.
    pub mutations: u64,
    /// Tombstones skipped.
    pub tombstones: u64,
    /// Messages whose resolution involved a conflict.
    pub conflicts: u64,
    /// Messages that failed and were skipped.
    pub skipped: u64,
    /// Sessions re-established after a transport failure.
    pub reconnects: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Drives a [`Handler`] from a [`MessageSource`].
pub struct Consumer<T: MessageSource> {
    transport: T,
    handler: Handler,
    config: ConsumerConfig,
    shutdown: ShutdownSignal,
    subscribed: Vec<String>,
    at_end: BTreeSet<String>,
    stats: ConsumeStats,
    reconnect_attempt: u32,
}

impl<T: MessageSource> Consumer<T> {
    /// Creates a consumer; nothing is polled until [`Consumer::run`].
    pub fn new(
        transport: T,
        handler: Handler,
        config: ConsumerConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            transport,
            handler,
            config,
            shutdown,
            subscribed: Vec::new(),
            at_end: BTreeSet::new(),
            stats: ConsumeStats::default(),
            reconnect_attempt: 0,
        }
    }

    /// Returns the statistics gathered so far.
    pub fn stats(&self) -> &ConsumeStats {
        &self.stats
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consumes the loop and returns the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Returns the signal that stops this loop.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Runs until shutdown, until every topic is consumed (with
    /// `stop_at_end`), or until an error the loop cannot recover from.
    ///
    /// # Errors
    ///
    /// - `Config` if the configuration is invalid
    /// - `BrokerUnavailable` if the transport never became reachable
    /// - a message error under [`MessageErrorPolicy::Fail`]
    /// - a transport error once the reconnect policy is exhausted
    pub fn run(&mut self) -> SyncResult<ConsumeStats> {
        self.config.validate()?;
        info!(
            group_id = %self.config.group_id,
            topics = ?self.config.topics,
            strategy = self.handler.strategy_name(),
            "starting consumer"
        );

        let result = loop {
            match self.session() {
                Ok(()) => break Ok(()),
                Err(SyncError::Cancelled) => {
                    info!("consumer cancelled");
                    break Ok(());
                }
                Err(e) if e.is_retryable() => {
                    self.stats.last_error = Some(e.to_string());
                    self.reconnect_attempt += 1;
                    let retry = &self.config.reconnect_retry;
                    if !retry.allows_attempt(self.reconnect_attempt + 1) {
                        error!(error = %e, attempts = self.reconnect_attempt, "giving up on transport");
                        break Err(e);
                    }

                    let delay = retry.delay_for_attempt(self.reconnect_attempt);
                    warn!(
                        error = %e,
                        attempt = self.reconnect_attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transport failed, reconnecting"
                    );
                    if self.shutdown.wait_timeout(delay) {
                        info!("consumer cancelled");
                        break Ok(());
                    }
                    self.stats.reconnects += 1;
                }
                Err(e) => {
                    self.stats.last_error = Some(e.to_string());
                    break Err(e);
                }
            }
        };

        if let Err(e) = self.transport.close() {
            warn!(error = %e, "failed to close transport");
        }
        info!(
            messages = self.stats.messages,
            mutations = self.stats.mutations,
            conflicts = self.stats.conflicts,
            skipped = self.stats.skipped,
            "consumer stopped"
        );
        result.map(|()| self.stats.clone())
    }

    fn session(&mut self) -> SyncResult<()> {
        self.wait_for_transport()?;
        self.subscribed.clear();
        self.at_end.clear();
        self.refresh_subscriptions()?;

        loop {
            if self.shutdown.is_triggered() {
                return Err(SyncError::Cancelled);
            }
            if self.config.stop_at_end && self.at_end.len() == self.subscribed.len() {
                info!("all subscribed topics consumed");
                return Ok(());
            }
            if self.subscribed.len() < self.config.topics.len() {
                self.refresh_subscriptions()?;
            }

            match self.transport.poll(self.config.poll_timeout)? {
                None => {
                    if self.subscribed.is_empty()
                        && self.shutdown.wait_timeout(self.config.poll_timeout)
                    {
                        return Err(SyncError::Cancelled);
                    }
                }
                Some(PollEvent::EndOfPartition { topic }) => {
                    info!(topic = %topic, "reached end of topic, replica is up to date");
                    self.at_end.insert(topic);
                }
                Some(PollEvent::Message(message)) => {
                    self.reconnect_attempt = 0;
                    self.at_end.remove(&message.topic);
                    self.process(&message)?;
                }
            }
        }
    }

    fn wait_for_transport(&mut self) -> SyncResult<()> {
        let mut attempt = 0u32;
        loop {
            if self.shutdown.is_triggered() {
                return Err(SyncError::Cancelled);
            }
            attempt += 1;

            match self.transport.connect(&self.config.group_id) {
                Ok(()) => {
                    info!(attempt, "transport ready");
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    let retry = &self.config.connect_retry;
                    if !retry.allows_attempt(attempt + 1) {
                        error!(error = %e, attempts = attempt, "transport not available");
                        return Err(SyncError::BrokerUnavailable { attempts: attempt });
                    }
                    let delay = retry.delay_for_attempt(attempt);
                    info!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transport not ready, retrying"
                    );
                    if self.shutdown.wait_timeout(delay) {
                        return Err(SyncError::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn refresh_subscriptions(&mut self) -> SyncResult<()> {
        let available = self.transport.topics()?;
        let wanted: Vec<String> = self
            .config
            .topics
            .iter()
            .filter(|topic| available.contains(*topic))
            .cloned()
            .collect();

        let new: Vec<&String> = wanted
            .iter()
            .filter(|topic| !self.subscribed.contains(topic))
            .collect();
        if new.is_empty() {
            if self.subscribed.is_empty() {
                debug!(topics = ?self.config.topics, "no configured topic exists yet");
            }
            return Ok(());
        }

        info!(topics = ?new, "subscribed to new topics");
        self.transport.subscribe(&wanted)?;
        self.subscribed = wanted;
        Ok(())
    }

    fn process(&mut self, message: &RawMessage) -> SyncResult<()> {
        if message.is_tombstone() {
            debug!(topic = %message.topic, offset = message.offset, "skipping tombstone");
            self.stats.tombstones += 1;
            return self.transport.commit(message);
        }

        self.stats.messages += 1;
        match self.handler.handle(message) {
            Ok(resolution) => {
                debug!(topic = %message.topic, offset = message.offset, ?resolution, "resolved");
                if resolution.is_mutation() {
                    self.stats.mutations += 1;
                }
                if resolution.is_conflict() {
                    self.stats.conflicts += 1;
                }
            }
            Err(e) if e.is_store_closed() || self.shutdown.is_triggered() => {
                info!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %e,
                    "replica closing, leaving message uncommitted"
                );
                return Err(SyncError::Cancelled);
            }
            Err(e)
                if e.is_message_error()
                    && self.config.on_message_error == MessageErrorPolicy::Skip =>
            {
                error!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %e,
                    "failed to resolve message, skipping"
                );
                self.stats.skipped += 1;
                self.stats.last_error = Some(e.to_string());
            }
            Err(e) => {
                error!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %e,
                    "failed to resolve message"
                );
                return Err(e);
            }
        }

        self.transport.commit(message)
    }
}
