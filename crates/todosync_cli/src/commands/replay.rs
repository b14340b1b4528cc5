//! Replay command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use todosync_engine::{
    ConsumeStats, ConsumerConfig, JsonLinesSource, MessageErrorPolicy, ReplicaContext,
    ReplicaRole, RetryConfig,
};
use todosync_store::{FileStore, RecordStore};
use tracing::info;

/// Options of the replay command.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Side of the sync to play.
    pub role: ReplicaRole,
    /// JSON-lines change log.
    pub log: PathBuf,
    /// Replica state file.
    pub state: PathBuf,
    /// Skip messages that cannot be resolved instead of stopping.
    pub skip_errors: bool,
    /// Consumer group of a client replica.
    pub client_id: String,
    /// Number of client topics the server consumes.
    pub num_clients: u32,
}

impl ReplayOptions {
    fn consumer_config(&self) -> ConsumerConfig {
        let config = match self.role {
            ReplicaRole::Client => ConsumerConfig::for_client(self.client_id.clone()),
            ReplicaRole::Server => ConsumerConfig::for_server(self.num_clients),
        };
        let policy = if self.skip_errors {
            MessageErrorPolicy::Skip
        } else {
            MessageErrorPolicy::Fail
        };
        config
            .with_connect_retry(RetryConfig::no_retry())
            .with_reconnect_retry(RetryConfig::no_retry())
            .with_message_error_policy(policy)
            .with_stop_at_end(true)
    }
}

/// Replays the log and returns the consumption statistics.
pub fn replay(options: &ReplayOptions) -> Result<ConsumeStats, Box<dyn std::error::Error>> {
    info!("Replaying {:?} into {:?}", options.log, options.state);

    let source = JsonLinesSource::open(&options.log)?;
    let store = Arc::new(FileStore::open_with_create_dirs(&options.state)?);
    let replica = ReplicaContext::open(options.role, store);

    let result = replica.consumer(source, options.consumer_config()).run();
    let records = replica.store().len();
    replica.close()?;

    let stats = result?;
    info!("Replica now holds {} records", records?);
    Ok(stats)
}

/// Runs the replay command.
pub fn run(options: &ReplayOptions) -> Result<(), Box<dyn std::error::Error>> {
    let stats = replay(options)?;

    println!("Replay complete ({})", options.role);
    println!("  Messages:   {}", stats.messages);
    println!("  Mutations:  {}", stats.mutations);
    println!("  Conflicts:  {}", stats.conflicts);
    println!("  Tombstones: {}", stats.tombstones);
    println!("  Skipped:    {}", stats.skipped);
    if let Some(error) = &stats.last_error {
        println!("  Last error: {error}");
    }

    Ok(())
}
