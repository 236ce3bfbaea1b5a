//! JSON line encoding of the worker channel

use crate::Result;
use serde_json::Value;
use termworker_types::{Command, Event, SessionId};
use thiserror::Error;

/// An inbound line that could not be turned into a [`Command`].
///
/// Carries the session id when the line was at least a JSON object with a
/// string `id`, so the failure can still be reported on that session.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DecodeError {
    pub id: SessionId,
    pub message: String,
}

impl DecodeError {
    pub fn into_event(self) -> Event {
        Event::Error {
            id: self.id,
            error: self.message,
        }
    }
}

/// Parse one inbound message
pub fn decode_command(line: &str) -> std::result::Result<Command, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError {
        id: SessionId::new(),
        message: format!("invalid JSON: {}", e),
    })?;

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    serde_json::from_value(value).map_err(|e| DecodeError {
        id,
        message: format!("invalid message: {}", e),
    })
}

/// Serialize one outbound event, without line terminator
pub fn encode_event(event: &Event) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}
