//! # todosync Store
//!
//! Record store gateway and implementations for todosync.
//!
//! The conflict resolvers never touch replica state directly; every read
//! and write goes through a [`RecordStore`] transaction. A transaction
//! either commits all of its writes or none of them.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral replicas
//! - [`FileStore`] - JSON snapshot file, rewritten atomically on commit
//!
//! ## Example
//!
//! ```rust
//! use todosync_protocol::{Record, RecordKey};
//! use todosync_store::{InMemoryStore, RecordStore};
//!
//! let store = InMemoryStore::new();
//! let at = "2024-01-01T00:00:00Z".parse().unwrap();
//! store
//!     .transaction(|txn| txn.insert(Record::new(1, "c1", "Buy milk", at)))
//!     .unwrap();
//! assert!(store.find(&RecordKey::new(1, "c1")).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod file;
mod gateway;
mod memory;
mod overlay;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use gateway::{RecordStore, RecordTxn};
pub use memory::InMemoryStore;
