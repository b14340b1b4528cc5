//! # todosync Engine
//!
//! Conflict resolution and change-stream consumption for todosync.
//!
//! This crate provides:
//! - The [`ResolveStrategy`] capability set (create / update / delete)
//! - [`ClientStrategy`]: clients defer to the server, except for deletes
//!   whose preimage a local edit invalidated
//! - [`ServerStrategy`]: last-write-wins by `updated_at`, blocking
//!   conflicting creates and honoring every delete
//! - [`Handler`]: decodes a raw message and dispatches on its operation
//! - [`Consumer`]: the sequential poll / resolve / commit loop with
//!   cancellable broker wait and reconnect
//! - [`ReplicaContext`]: explicit per-replica lifecycle
//!
//! ## Architecture
//!
//! ```text
//! transport ─► Handler ─► (Client|Server)Strategy ─► RecordStore
//! ```
//!
//! ## Key Invariants
//!
//! - Server is authoritative for creates and updates
//! - An event redescribing stored state never mutates storage
//! - Every resolution runs in one store transaction
//! - Conflicts are outcomes, logged and counted, never errors
//! - One message is fully resolved before the next is polled

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod consumer;
mod context;
mod error;
mod handler;
mod jsonl;
mod server;
mod shutdown;
mod strategy;
mod transport;

pub use client::ClientStrategy;
pub use config::{
    client_topic, ConsumerConfig, MessageErrorPolicy, RetryConfig, SERVER_GROUP_ID, SERVER_TOPIC,
};
pub use consumer::{ConsumeStats, Consumer};
pub use context::{ReplicaContext, ReplicaRole};
pub use error::{SyncError, SyncResult};
pub use handler::Handler;
pub use jsonl::JsonLinesSource;
pub use server::ServerStrategy;
pub use shutdown::ShutdownSignal;
pub use strategy::{Resolution, ResolveStrategy};
pub use transport::{MemoryTransport, MessageSource, PollEvent};
