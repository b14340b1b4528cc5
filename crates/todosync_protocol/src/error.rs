//! Error types for envelope decoding.

use crate::envelope::{EnvelopePart, OperationKind};
use crate::record::RecordKey;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while decoding a change event.
///
/// All of these are fatal for the message that produced them.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The key or value document is not valid JSON of the expected shape.
    #[error("malformed envelope {part}: {source}")]
    Decode {
        /// Which half of the message failed.
        part: EnvelopePart,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The operation code is missing or not one of `c`, `u`, `d`.
    #[error("invalid operation code: {op:?}")]
    InvalidOperation {
        /// The code found in the payload, if any.
        op: Option<String>,
    },

    /// An event lacks an image it cannot be applied without.
    #[error("{kind} event is missing its `{image}` image")]
    MissingImage {
        /// Operation of the event.
        kind: OperationKind,
        /// Name of the missing image (`before` or `after`).
        image: &'static str,
    },

    /// A record image belongs to a different record than the envelope key.
    #[error("`{image}` image {found} does not match envelope key {key}")]
    KeyMismatch {
        /// Key carried by the envelope.
        key: RecordKey,
        /// Key of the offending image.
        found: RecordKey,
        /// Name of the offending image.
        image: &'static str,
    },

    /// A tombstone (no value) was handed to the decoder.
    #[error("tombstone on topic {topic} has no value to decode")]
    Tombstone {
        /// Topic the tombstone was read from.
        topic: String,
    },

    /// Encoding an envelope back to JSON failed.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    pub(crate) fn decode(part: EnvelopePart, source: serde_json::Error) -> Self {
        Self::Decode { part, source }
    }
}
