//! Terminal PTY abstraction traits

use crate::Result;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use termworker_types::{ExitInfo, SessionId, TermSize};
use tokio::sync::mpsc;

/// What to spawn inside a new pseudo-terminal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Program to run; `None` means the backend's default shell
    pub shell: Option<String>,
    pub size: TermSize,
    /// Working directory; `None` means the user's home directory
    pub cwd: Option<PathBuf>,
    /// Variables added to the inherited environment
    pub env: HashMap<String, String>,
}

impl SpawnSpec {
    pub fn display_shell(&self) -> &str {
        self.shell.as_deref().unwrap_or("<default shell>")
    }
}

/// Terminal backend for spawning PTY sessions
pub trait PtyBackend: Send + Sync {
    /// Spawn a new process in a PTY.
    ///
    /// Output and termination must be reported through `listener`, from any
    /// thread. The exit notification must come after the last data chunk.
    fn spawn(&self, spec: &SpawnSpec, listener: PtyListener) -> Result<Box<dyn PtyProcess>>;
}

/// A spawned PTY process, owned by exactly one session
pub trait PtyProcess: Send {
    /// Write data to the terminal input
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Resize the terminal
    fn resize(&mut self, size: TermSize) -> Result<()>;

    /// Kill the process without waiting for it
    fn kill(&mut self) -> Result<()>;

    /// Get the process ID
    fn pid(&self) -> Option<u32>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEventKind {
    Data(Bytes),
    Exit(ExitInfo),
}

/// Notification from a PTY back to the multiplexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyEvent {
    pub id: SessionId,
    /// Spawn generation the event belongs to
    pub generation: u64,
    pub kind: PtyEventKind,
}

/// Data/exit subscription handed to a backend for one spawned process.
///
/// The session tag is fixed when the listener is created, so every event a
/// backend reports lands on the session it was spawned for.
#[derive(Debug, Clone)]
pub struct PtyListener {
    id: SessionId,
    generation: u64,
    tx: mpsc::UnboundedSender<PtyEvent>,
}

impl PtyListener {
    pub(crate) fn new(
        id: SessionId,
        generation: u64,
        tx: mpsc::UnboundedSender<PtyEvent>,
    ) -> Self {
        Self { id, generation, tx }
    }

    /// Standalone listener with its own receiver, for driving a backend
    /// outside a multiplexer.
    pub fn channel(id: impl Into<SessionId>) -> (Self, mpsc::UnboundedReceiver<PtyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id.into(), 0, tx), rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Report a chunk of output. Returns `false` once nobody is listening.
    pub fn data(&self, chunk: impl Into<Bytes>) -> bool {
        self.send(PtyEventKind::Data(chunk.into()))
    }

    /// Report process termination. Returns `false` once nobody is listening.
    pub fn exit(&self, info: ExitInfo) -> bool {
        self.send(PtyEventKind::Exit(info))
    }

    fn send(&self, kind: PtyEventKind) -> bool {
        self.tx
            .send(PtyEvent {
                id: self.id.clone(),
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_tags_events() {
        let (listener, mut rx) = PtyListener::channel("term-1");
        assert!(listener.data(&b"hello"[..]));
        assert!(listener.exit(ExitInfo::with_code(3)));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.id, "term-1");
        assert_eq!(first.kind, PtyEventKind::Data(Bytes::from_static(b"hello")));

        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, PtyEventKind::Exit(ExitInfo::with_code(3)));
    }

    #[test]
    fn test_listener_reports_closed_channel() {
        let (listener, rx) = PtyListener::channel("gone");
        drop(rx);
        assert!(!listener.data(&b"x"[..]));
    }
}
