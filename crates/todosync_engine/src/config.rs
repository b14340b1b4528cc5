//! Configuration for the consumption loop.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Topic carrying the server's change feed, consumed by every client.
pub const SERVER_TOPIC: &str = "server-topic.public.todos";

/// Consumer group the server joins.
pub const SERVER_GROUP_ID: &str = "server-consumer-group";

/// Returns the change-feed topic of client number `index` (1-based).
pub fn client_topic(index: u32) -> String {
    format!("client-{index}-topic.public.todos")
}

/// What the loop does when a single message cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageErrorPolicy {
    /// Stop the loop and return the error without committing the message.
    Fail,
    /// Log the error, commit past the message and continue.
    Skip,
}

/// Configuration for the consumption loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group id.
    pub group_id: String,
    /// Topics to consume; ones that do not exist yet are picked up later.
    pub topics: Vec<String>,
    /// Maximum time a single poll blocks.
    pub poll_timeout: Duration,
    /// Retry policy while waiting for the transport to become reachable.
    pub connect_retry: RetryConfig,
    /// Retry policy for reconnecting after a transport failure.
    pub reconnect_retry: RetryConfig,
    /// Handling of per-message failures.
    pub on_message_error: MessageErrorPolicy,
    /// Return once every subscribed topic reported its end.
    pub stop_at_end: bool,
}

impl ConsumerConfig {
    /// Creates a configuration for `group_id` consuming `topics`.
    pub fn new(group_id: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            group_id: group_id.into(),
            topics,
            poll_timeout: Duration::from_secs(1),
            connect_retry: RetryConfig::fixed(10, Duration::from_secs(5)),
            reconnect_retry: RetryConfig::unbounded(Duration::from_secs(5)),
            on_message_error: MessageErrorPolicy::Fail,
            stop_at_end: false,
        }
    }

    /// Configuration of a client replica: its own group, the server topic.
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self::new(client_id, vec![SERVER_TOPIC.to_string()])
    }

    /// Configuration of the server replica: one topic per client.
    pub fn for_server(num_clients: u32) -> Self {
        Self::new(SERVER_GROUP_ID, (1..=num_clients).map(client_topic).collect())
    }

    /// Sets the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the broker wait policy.
    pub fn with_connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_reconnect_retry(mut self, retry: RetryConfig) -> Self {
        self.reconnect_retry = retry;
        self
    }

    /// Sets the per-message error policy.
    pub fn with_message_error_policy(mut self, policy: MessageErrorPolicy) -> Self {
        self.on_message_error = policy;
        self
    }

    /// Stops the loop once every subscribed topic has been read to its end.
    pub fn with_stop_at_end(mut self, stop: bool) -> Self {
        self.stop_at_end = stop;
        self
    }

    /// Checks the configuration for obvious mistakes.
    pub fn validate(&self) -> SyncResult<()> {
        if self.topics.is_empty() {
            return Err(SyncError::Config("no topics configured".into()));
        }
        if self.group_id.is_empty() {
            return Err(SyncError::Config("empty consumer group id".into()));
        }
        Ok(())
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::new("todosync", Vec::new())
    }
}

/// Configuration for retry behavior.
///
/// Attempts are numbered from 1. The delay before attempt `n + 1` is
/// `delay_for_attempt(n)`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Multiplier applied per further attempt; 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// At most `max_attempts` attempts, `delay` apart.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Unlimited attempts, `delay` apart.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            ..Self::fixed(1, delay)
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns true if attempt number `attempt` may be made.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Calculates the delay after failed attempt `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());

        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(10, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_topics() {
        let client = ConsumerConfig::for_client("client-1");
        assert_eq!(client.group_id, "client-1");
        assert_eq!(client.topics, vec![SERVER_TOPIC.to_string()]);

        let server = ConsumerConfig::for_server(3);
        assert_eq!(server.group_id, SERVER_GROUP_ID);
        assert_eq!(
            server.topics,
            vec![
                "client-1-topic.public.todos",
                "client-2-topic.public.todos",
                "client-3-topic.public.todos",
            ]
        );
    }

    #[test]
    fn defaults_match_broker_wait() {
        let config = ConsumerConfig::for_client("c1");
        assert_eq!(config.connect_retry.max_attempts, Some(10));
        assert_eq!(config.connect_retry.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.reconnect_retry.max_attempts, None);
        assert_eq!(config.on_message_error, MessageErrorPolicy::Fail);
        assert!(!config.stop_at_end);
    }

    #[test]
    fn validate_rejects_empty_topics() {
        assert!(ConsumerConfig::default().validate().is_err());
        assert!(ConsumerConfig::for_server(0).validate().is_err());
        assert!(ConsumerConfig::for_server(1).validate().is_ok());
    }

    #[test]
    fn attempts_are_bounded() {
        let retry = RetryConfig::fixed(3, Duration::from_millis(10));
        assert!(retry.allows_attempt(1));
        assert!(retry.allows_attempt(3));
        assert!(!retry.allows_attempt(4));

        let forever = RetryConfig::unbounded(Duration::from_millis(10));
        assert!(forever.allows_attempt(u32::MAX));

        assert!(!RetryConfig::no_retry().allows_attempt(2));
    }

    #[test]
    fn backoff_respects_max() {
        let retry = RetryConfig::fixed(10, Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(5), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(u32::MAX), Duration::from_millis(500));
    }
}
