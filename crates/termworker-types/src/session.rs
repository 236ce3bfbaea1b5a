//! Session types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Opaque, caller-chosen identifier of a terminal session.
pub type SessionId = String;

/// Terminal geometry in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Both dimensions must be non-zero for a PTY to accept them.
    pub fn is_valid(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl std::fmt::Display for TermSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Payload of a `create` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOptions {
    pub cols: u16,
    pub rows: u16,
    /// Program to run inside the PTY. Empty means the platform default shell.
    #[serde(default)]
    pub shell: String,
    /// Working directory; the user's home directory when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Extra environment on top of the worker's own.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl CreateOptions {
    pub fn new(cols: u16, rows: u16, shell: impl Into<String>) -> Self {
        Self {
            cols,
            rows,
            shell: shell.into(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn size(&self) -> TermSize {
        TermSize::new(self.cols, self.rows)
    }
}

/// How a PTY process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit status. When a signal ended the process this is a
    /// platform placeholder (1 on Unix) rather than a real status.
    pub code: i32,
    /// Human readable name of the terminating signal as `strsignal(3)`
    /// describes it, e.g. `"Hangup"` or `"Killed"`, not `"SIGHUP"`.
    pub signal: Option<String>,
}

impl ExitInfo {
    pub fn with_code(code: i32) -> Self {
        Self { code, signal: None }
    }

    pub fn with_signal(code: i32, signal: impl Into<String>) -> Self {
        Self {
            code,
            signal: Some(signal.into()),
        }
    }
}
