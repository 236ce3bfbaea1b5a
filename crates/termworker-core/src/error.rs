//! Error types for the terminal worker

use termworker_types::SessionId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TermError>;

#[derive(Error, Debug)]
pub enum TermError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session already exists: {0}")]
    SessionExists(SessionId),

    #[error("failed to spawn '{shell}': {reason}")]
    SpawnFailure { shell: String, reason: String },

    #[error("failed to terminate session {id}: {reason}")]
    TerminationFailure { id: SessionId, reason: String },

    #[error("invalid terminal size {cols}x{rows}")]
    InvalidGeometry { cols: u16, rows: u16 },

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TermError {
    fn from(e: serde_json::Error) -> Self {
        TermError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termworker_types::Event;

    #[test]
    fn test_messages_name_the_session() {
        let event = Event::error("t9", TermError::SessionNotFound("t9".into()));
        assert_eq!(
            event,
            Event::Error {
                id: "t9".into(),
                error: "session not found: t9".into()
            }
        );

        let err = TermError::SpawnFailure {
            shell: "/bin/nope".into(),
            reason: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to spawn '/bin/nope': No such file or directory"
        );
    }

    #[test]
    fn test_json_error_converts() {
        let err: TermError = serde_json::from_str::<u32>("x").unwrap_err().into();
        assert!(matches!(err, TermError::Serialization(_)));
    }
}
