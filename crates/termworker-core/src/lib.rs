//! Terminal worker core library
//!
//! Session multiplexing over pseudo-terminals, independent of any concrete
//! PTY implementation or transport.
//!
//! - [`Multiplexer`] owns the session map and routes commands and PTY events.
//! - [`ports`] holds the narrow traits a PTY backend must implement.
//! - [`codec`] turns channel lines into commands and events into lines.

// Re-export protocol types from termworker-types
pub use termworker_types::*;

pub mod codec;
pub mod error;
pub mod multiplexer;
pub mod ports;
pub mod utf8;

pub use error::{Result, TermError};
pub use multiplexer::Multiplexer;
pub use ports::{PtyBackend, PtyEvent, PtyEventKind, PtyListener, PtyProcess, SpawnSpec};
