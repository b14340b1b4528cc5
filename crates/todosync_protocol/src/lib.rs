//! # todosync Protocol
//!
//! Record model and change-event envelope types for todosync.
//!
//! This crate provides:
//! - `Record` and its composite `RecordKey` (id, owning client)
//! - `RecordPatch` for the field sets applied on update
//! - `RawMessage` as handed over by a transport
//! - `ChangeEnvelope` decoding with `OperationKind` derivation
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod envelope;
mod error;
mod record;

pub use envelope::{ChangeEnvelope, EnvelopePart, OperationKind, RawMessage};
pub use error::{ProtocolError, ProtocolResult};
pub use record::{Record, RecordKey, RecordPatch};
