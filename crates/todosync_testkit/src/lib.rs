//! # todosync Testkit
//!
//! Test utilities for todosync.
//!
//! This crate provides:
//! - Fixtures: fixed timestamps, record builders, raw envelopes
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use todosync_testkit::prelude::*;
//!
//! let record = todo(1, "c1", "Buy milk", 10);
//! let store = store_with([record.clone()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
