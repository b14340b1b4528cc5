//! Change-event envelopes.
//!
//! A CDC connector publishes one message per committed row mutation. The
//! message key identifies the row, the value carries the operation code and
//! the row images before and after the change:
//!
//! ```text
//! key   = {"payload": {"id": 1, "client_id": "c1"}}
//! value = {"payload": {"op": "u", "before": {..}, "after": {..}}}
//! ```
//!
//! Any other top-level members (connector schema, source metadata) are
//! ignored.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{Record, RecordKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A record was inserted.
    Create,
    /// A record was modified.
    Update,
    /// A record was removed.
    Delete,
}

impl OperationKind {
    /// Converts to the single-letter operation code.
    pub fn to_code(&self) -> &'static str {
        match self {
            OperationKind::Create => "c",
            OperationKind::Update => "u",
            OperationKind::Delete => "d",
        }
    }

    /// Converts from an operation code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "c" => Some(OperationKind::Create),
            "u" => Some(OperationKind::Update),
            "d" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        })
    }
}

/// Which half of a transport message a decode error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePart {
    /// The message key.
    Key,
    /// The message value.
    Value,
}

impl fmt::Display for EnvelopePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnvelopePart::Key => "key",
            EnvelopePart::Value => "value",
        })
    }
}

/// A message as delivered by the transport, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Position of the message within its topic.
    pub offset: u64,
    /// Key bytes.
    pub key: Option<Vec<u8>>,
    /// Value bytes; `None` marks a tombstone.
    pub value: Option<Vec<u8>>,
}

impl RawMessage {
    /// Creates a message carrying both key and value.
    pub fn new(topic: impl Into<String>, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            offset: 0,
            key: Some(key),
            value: Some(value),
        }
    }

    /// Creates a tombstone for `key`.
    pub fn tombstone(topic: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            offset: 0,
            key: Some(key),
            value: None,
        }
    }

    /// Sets the offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Returns true if this message has no value.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Serialize, Deserialize)]
struct KeyDocument {
    payload: RecordKey,
}

#[derive(Serialize, Deserialize)]
struct ValueDocument {
    #[serde(default)]
    payload: Option<ValuePayload>,
}

#[derive(Serialize, Deserialize)]
struct ValuePayload {
    // Kept loose so a non-string code is an invalid operation, not a decode error.
    #[serde(default)]
    op: Option<serde_json::Value>,
    #[serde(default)]
    before: Option<Record>,
    #[serde(default)]
    after: Option<Record>,
}

/// A decoded change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEnvelope {
    /// Identity of the changed record.
    pub key: RecordKey,
    /// Operation derived from the op code.
    pub kind: OperationKind,
    /// Row image before the change, if the connector provided one.
    pub before: Option<Record>,
    /// Row image after the change.
    pub after: Option<Record>,
}

impl ChangeEnvelope {
    /// Creates a CREATE event for `after`.
    pub fn create(after: Record) -> Self {
        Self {
            key: after.key(),
            kind: OperationKind::Create,
            before: None,
            after: Some(after),
        }
    }

    /// Creates an UPDATE event from `before` to `after`.
    pub fn update(before: Record, after: Record) -> Self {
        Self {
            key: after.key(),
            kind: OperationKind::Update,
            before: Some(before),
            after: Some(after),
        }
    }

    /// Creates a DELETE event whose preimage is `before`.
    pub fn delete(before: Record) -> Self {
        Self {
            key: before.key(),
            kind: OperationKind::Delete,
            before: Some(before),
            after: None,
        }
    }

    /// Decodes a transport message.
    ///
    /// Tombstones are expected to be filtered by the caller and are rejected.
    pub fn from_message(message: &RawMessage) -> ProtocolResult<Self> {
        let value = message.value.as_deref().ok_or_else(|| ProtocolError::Tombstone {
            topic: message.topic.clone(),
        })?;
        let key = message.key.as_deref().unwrap_or_default();
        Self::decode(key, value)
    }

    /// Decodes the key and value documents of a change event.
    ///
    /// # Errors
    ///
    /// - `Decode` if either document is not the expected JSON shape
    /// - `InvalidOperation` if the op code is absent or unknown
    /// - `MissingImage` if a CREATE or UPDATE has no `after`
    /// - `KeyMismatch` if an image belongs to another record
    pub fn decode(key: &[u8], value: &[u8]) -> ProtocolResult<Self> {
        let key_doc: KeyDocument = serde_json::from_slice(key)
            .map_err(|e| ProtocolError::decode(EnvelopePart::Key, e))?;
        let value_doc: ValueDocument = serde_json::from_slice(value)
            .map_err(|e| ProtocolError::decode(EnvelopePart::Value, e))?;

        let payload = value_doc.payload.unwrap_or(ValuePayload {
            op: None,
            before: None,
            after: None,
        });
        let kind = derive_kind(payload.op.as_ref())?;

        let envelope = Self {
            key: key_doc.payload,
            kind,
            before: payload.before,
            after: payload.after,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Checks that the images fit the operation and the key.
    pub fn validate(&self) -> ProtocolResult<()> {
        if matches!(self.kind, OperationKind::Create | OperationKind::Update) && self.after.is_none()
        {
            return Err(ProtocolError::MissingImage {
                kind: self.kind,
                image: "after",
            });
        }

        for (image, record) in [("before", &self.before), ("after", &self.after)] {
            if let Some(record) = record {
                if !record.has_key(&self.key) {
                    return Err(ProtocolError::KeyMismatch {
                        key: self.key.clone(),
                        found: record.key(),
                        image,
                    });
                }
            }
        }

        Ok(())
    }

    /// Returns the `after` image, failing if the event has none.
    pub fn after_image(&self) -> ProtocolResult<&Record> {
        self.after.as_ref().ok_or(ProtocolError::MissingImage {
            kind: self.kind,
            image: "after",
        })
    }

    /// Returns true if `before` is present and equal to `record`.
    pub fn before_matches(&self, record: &Record) -> bool {
        self.before.as_ref() == Some(record)
    }

    /// Returns true if `after` is present and equal to `record`.
    pub fn after_matches(&self, record: &Record) -> bool {
        self.after.as_ref() == Some(record)
    }

    /// Encodes the key document.
    pub fn encode_key(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(&KeyDocument {
            payload: self.key.clone(),
        })
        .map_err(ProtocolError::Encode)
    }

    /// Encodes the value document.
    pub fn encode_value(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(&ValueDocument {
            payload: Some(ValuePayload {
                op: Some(serde_json::Value::from(self.kind.to_code())),
                before: self.before.clone(),
                after: self.after.clone(),
            }),
        })
        .map_err(ProtocolError::Encode)
    }

    /// Encodes this event as a transport message on `topic`.
    pub fn to_message(&self, topic: impl Into<String>) -> ProtocolResult<RawMessage> {
        Ok(RawMessage::new(topic, self.encode_key()?, self.encode_value()?))
    }
}

fn derive_kind(op: Option<&serde_json::Value>) -> ProtocolResult<OperationKind> {
    match op {
        Some(serde_json::Value::String(code)) => {
            OperationKind::from_code(code).ok_or_else(|| ProtocolError::InvalidOperation {
                op: Some(code.clone()),
            })
        }
        Some(serde_json::Value::Null) | None => Err(ProtocolError::InvalidOperation { op: None }),
        Some(other) => Err(ProtocolError::InvalidOperation {
            op: Some(other.to_string()),
        }),
    }
}
