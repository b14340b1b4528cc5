//! Decode command implementation.

use serde::Serialize;
use std::path::Path;
use todosync_engine::JsonLinesSource;
use todosync_protocol::{ChangeEnvelope, RawMessage};
use tracing::info;

/// One decoded log message.
#[derive(Debug, Serialize)]
pub struct DecodedMessage {
    /// Topic.
    pub topic: String,
    /// Offset within the topic.
    pub offset: u64,
    /// Operation ("CREATE", "UPDATE", "DELETE"), "TOMBSTONE", or "ERROR".
    pub operation: String,
    /// Record key, when the message decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Decode failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecodedMessage {
    fn from_message(message: &RawMessage) -> Self {
        let (operation, key, error) = if message.is_tombstone() {
            ("TOMBSTONE".to_string(), None, None)
        } else {
            match ChangeEnvelope::from_message(message) {
                Ok(event) => (event.kind.to_string(), Some(event.key.to_string()), None),
                Err(e) => ("ERROR".to_string(), None, Some(e.to_string())),
            }
        };
        Self {
            topic: message.topic.clone(),
            offset: message.offset,
            operation,
            key,
            error,
        }
    }
}

/// Decodes every message of a log.
pub fn decode_all(source: &JsonLinesSource) -> Vec<DecodedMessage> {
    source
        .messages()
        .iter()
        .map(DecodedMessage::from_message)
        .collect()
}

/// Runs the decode command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Decoding change log {:?}", path);

    let source = JsonLinesSource::open(path)?;
    let decoded = decode_all(&source);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&decoded)?);
        }
        _ => {
            for message in &decoded {
                print!("{}@{}  {}", message.topic, message.offset, message.operation);
                if let Some(key) = &message.key {
                    print!("  {key}");
                }
                if let Some(error) = &message.error {
                    print!("  {error}");
                }
                println!();
            }
            let failures = decoded.iter().filter(|m| m.error.is_some()).count();
            println!("{} messages, {} failed to decode", decoded.len(), failures);
        }
    }

    Ok(())
}
