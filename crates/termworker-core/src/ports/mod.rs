//! Port traits (interfaces) for dependency injection

pub mod terminal;

pub use terminal::{PtyBackend, PtyEvent, PtyEventKind, PtyListener, PtyProcess, SpawnSpec};
