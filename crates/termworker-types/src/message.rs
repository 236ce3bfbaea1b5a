//! Worker channel message protocol
//!
//! Inbound messages are `{ action, id, data }` envelopes sent by the
//! controlling process. Outbound messages are `{ type, id, ... }` events
//! sent back by the worker, always tagged with the session they concern.

use super::{CreateOptions, ExitInfo, SessionId, TermSize};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Inbound action discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Write,
    Resize,
    Remove,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Write => write!(f, "write"),
            Action::Resize => write!(f, "resize"),
            Action::Remove => write!(f, "remove"),
        }
    }
}

/// Untyped inbound envelope as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub action: Action,
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid '{action}' payload: {message}")]
    InvalidPayload { action: Action, message: String },
}

/// Controller -> worker messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Envelope", into = "Envelope")]
pub enum Command {
    /// Spawn a new PTY for `id`
    Create { id: SessionId, options: CreateOptions },
    /// Raw terminal input
    Write { id: SessionId, data: String },
    /// New terminal geometry
    Resize { id: SessionId, size: TermSize },
    /// Kill the PTY and forget the session
    Remove { id: SessionId },
}

impl Command {
    pub fn id(&self) -> &str {
        match self {
            Command::Create { id, .. }
            | Command::Write { id, .. }
            | Command::Resize { id, .. }
            | Command::Remove { id } => id,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Command::Create { .. } => Action::Create,
            Command::Write { .. } => Action::Write,
            Command::Resize { .. } => Action::Resize,
            Command::Remove { .. } => Action::Remove,
        }
    }
}

impl TryFrom<Envelope> for Command {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let Envelope { action, id, data } = envelope;
        let invalid = |e: serde_json::Error| ProtocolError::InvalidPayload {
            action,
            message: e.to_string(),
        };

        let command = match action {
            Action::Create => Command::Create {
                id,
                options: serde_json::from_value(data).map_err(invalid)?,
            },
            Action::Write => Command::Write {
                id,
                data: serde_json::from_value(data).map_err(invalid)?,
            },
            Action::Resize => Command::Resize {
                id,
                size: serde_json::from_value(data).map_err(invalid)?,
            },
            // Any payload on remove is ignored
            Action::Remove => Command::Remove { id },
        };
        Ok(command)
    }
}

impl From<Command> for Envelope {
    fn from(command: Command) -> Self {
        let action = command.action();
        let (id, data) = match command {
            Command::Create { id, options } => {
                (id, serde_json::to_value(options).unwrap_or_default())
            }
            Command::Write { id, data } => (id, Value::String(data)),
            Command::Resize { id, size } => (id, serde_json::to_value(size).unwrap_or_default()),
            Command::Remove { id } => (id, Value::Null),
        };
        Envelope { action, id, data }
    }
}

/// Worker -> controller messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// PTY output
    Data { id: SessionId, data: String },
    /// The PTY process ended; the session is gone
    Exit { id: SessionId, data: ExitInfo },
    /// Handling a message for `id` failed
    Error { id: SessionId, error: String },
}

impl Event {
    pub fn id(&self) -> &str {
        match self {
            Event::Data { id, .. } | Event::Exit { id, .. } | Event::Error { id, .. } => id,
        }
    }

    pub fn error(id: impl Into<SessionId>, error: impl std::fmt::Display) -> Self {
        Event::Error {
            id: id.into(),
            error: error.to_string(),
        }
    }
}
