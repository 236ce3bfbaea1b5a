//! Session multiplexer - many PTYs behind one channel
//!
//! Demultiplexes inbound commands by session id and multiplexes PTY output
//! and lifecycle events back onto a single outbound channel:
//! - `create` spawns a PTY and arms its data/exit listener
//! - `write` / `resize` address a live session
//! - `remove` kills a session (idempotent)
//! - PTY exit removes the session and reports the exit
//!
//! The session map is owned by the `Multiplexer` value and only touched by
//! whoever drives it, so no locking is involved.

use futures::{Stream, StreamExt};
use std::collections::HashMap;
use termworker_types::{Command, CreateOptions, Event, SessionId, TermSize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, TermError};
use crate::ports::{PtyBackend, PtyEvent, PtyEventKind, PtyListener, PtyProcess, SpawnSpec};
use crate::utf8::Utf8Decoder;

struct SessionEntry {
    generation: u64,
    process: Box<dyn PtyProcess>,
    decoder: Utf8Decoder,
    size: TermSize,
}

/// Owner of all terminal sessions of one worker
pub struct Multiplexer<B: PtyBackend> {
    backend: B,
    sessions: HashMap<SessionId, SessionEntry>,
    next_generation: u64,
    pty_tx: mpsc::UnboundedSender<PtyEvent>,
    pty_rx: mpsc::UnboundedReceiver<PtyEvent>,
    events: mpsc::UnboundedSender<Event>,
}

impl<B: PtyBackend> Multiplexer<B> {
    /// Create a multiplexer that reports every outbound event to `events`.
    pub fn new(backend: B, events: mpsc::UnboundedSender<Event>) -> Self {
        let (pty_tx, pty_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            sessions: HashMap::new(),
            next_generation: 0,
            pty_tx,
            pty_rx,
            events,
        }
    }

    /// Handle one inbound command.
    ///
    /// Failures never escape: they are reported as an error event tagged with
    /// the command's session id.
    pub fn dispatch(&mut self, command: Command) {
        let id = command.id().to_string();
        let action = command.action();

        let result = match command {
            Command::Create { id, options } => self.create(id, options),
            Command::Write { id, data } => self.write(&id, data.as_bytes()),
            Command::Resize { id, size } => self.resize(&id, size),
            Command::Remove { id } => self.remove(&id).map(|_| ()),
        };

        if let Err(e) = result {
            warn!("{} failed for session {}: {}", action, id, e);
            self.emit(Event::error(id, e));
        }
    }

    /// Spawn a PTY for a new session
    pub fn create(&mut self, id: SessionId, options: CreateOptions) -> Result<()> {
        let size = options.size();
        if !size.is_valid() {
            return Err(TermError::InvalidGeometry {
                cols: size.cols,
                rows: size.rows,
            });
        }

        // Replacing would orphan the running process, so the original wins
        if self.sessions.contains_key(&id) {
            return Err(TermError::SessionExists(id));
        }

        let shell = Some(options.shell).filter(|s| !s.trim().is_empty());
        let spec = SpawnSpec {
            shell,
            size,
            cwd: options.cwd,
            env: options.env,
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let listener = PtyListener::new(id.clone(), generation, self.pty_tx.clone());

        let process = self
            .backend
            .spawn(&spec, listener)
            .map_err(|e| match e {
                e @ TermError::SpawnFailure { .. } => e,
                other => TermError::SpawnFailure {
                    shell: spec.display_shell().to_string(),
                    reason: other.to_string(),
                },
            })?;

        info!(
            "Created session {} ({}, {}, pid: {:?})",
            id,
            spec.display_shell(),
            size,
            process.pid()
        );

        self.sessions.insert(
            id,
            SessionEntry {
                generation,
                process,
                decoder: Utf8Decoder::new(),
                size,
            },
        );
        Ok(())
    }

    /// Send input to a session
    pub fn write(&mut self, id: &str, data: &[u8]) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.process.write(data)
    }

    /// Resize a session
    pub fn resize(&mut self, id: &str, size: TermSize) -> Result<()> {
        if !size.is_valid() {
            return Err(TermError::InvalidGeometry {
                cols: size.cols,
                rows: size.rows,
            });
        }

        let entry = self.entry_mut(id)?;
        entry.process.resize(size)?;
        entry.size = size;
        debug!("Resized session {} to {}", id, size);
        Ok(())
    }

    /// Kill a session and forget it.
    ///
    /// Returns `Ok(false)` when there was nothing to remove. The entry is gone
    /// even if the kill itself fails.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let Some(mut entry) = self.sessions.remove(id) else {
            debug!("Remove for unknown session {}, ignoring", id);
            return Ok(false);
        };

        info!("Removing session {}", id);
        entry
            .process
            .kill()
            .map_err(|e| TermError::TerminationFailure {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(true)
    }

    /// Apply one notification from a PTY
    pub fn handle_pty_event(&mut self, event: PtyEvent) {
        let PtyEvent {
            id,
            generation,
            kind,
        } = event;

        let entry = match self.sessions.get_mut(&id) {
            Some(entry) if entry.generation == generation => entry,
            _ => {
                debug!(
                    "Dropping stale PTY event for session {} (generation {})",
                    id, generation
                );
                return;
            }
        };

        match kind {
            PtyEventKind::Data(bytes) => {
                let text = entry.decoder.decode(&bytes);
                if !text.is_empty() {
                    self.emit(Event::Data { id, data: text });
                }
            }
            PtyEventKind::Exit(info) => {
                let tail = entry.decoder.flush();
                self.sessions.remove(&id);
                if !tail.is_empty() {
                    self.emit(Event::Data {
                        id: id.clone(),
                        data: tail,
                    });
                }
                info!(
                    "Session {} exited with code {} (signal: {:?})",
                    id, info.code, info.signal
                );
                self.emit(Event::Exit { id, data: info });
            }
        }
    }

    /// Apply every PTY event queued at the time of the call, without waiting.
    ///
    /// Events that arrive while draining are left for the next call, so a
    /// busy PTY cannot keep this from returning. Returns how many were applied.
    pub fn poll_pty_events(&mut self) -> usize {
        let queued = self.pty_rx.len();
        let mut applied = 0;
        while applied < queued {
            match self.pty_rx.try_recv() {
                Ok(event) => {
                    self.handle_pty_event(event);
                    applied += 1;
                }
                Err(_) => break,
            }
        }
        applied
    }

    /// Kill every remaining session and clear the map.
    ///
    /// Kill failures are logged and skipped so one stuck process cannot keep
    /// the others alive. Returns the number of sessions that were open.
    pub fn shutdown(&mut self) -> usize {
        let count = self.sessions.len();
        if count > 0 {
            info!("Shutting down {} terminal sessions", count);
        }

        for (id, mut entry) in self.sessions.drain() {
            if let Err(e) = entry.process.kill() {
                warn!("Failed to kill session {} during shutdown: {}", id, e);
            }
        }
        count
    }

    /// Drive the multiplexer until `inbound` ends, then shut down.
    ///
    /// Commands for one session are applied in arrival order. PTY events that
    /// are already queued are applied before each command, so a process that
    /// has exited is never addressed as live.
    pub async fn run<S>(&mut self, inbound: S)
    where
        S: Stream<Item = Command>,
    {
        tokio::pin!(inbound);

        loop {
            tokio::select! {
                Some(event) = self.pty_rx.recv() => {
                    self.handle_pty_event(event);
                }
                command = inbound.next() => match command {
                    Some(command) => {
                        self.poll_pty_events();
                        self.dispatch(command);
                    }
                    None => {
                        info!("Controller channel closed");
                        break;
                    }
                },
            }
        }

        self.shutdown();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// List all session IDs
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current geometry of a session
    pub fn size_of(&self, id: &str) -> Option<TermSize> {
        self.sessions.get(id).map(|entry| entry.size)
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut SessionEntry> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| TermError::SessionNotFound(id.to_string()))
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("Event channel closed, dropping event");
        }
    }
}

impl<B: PtyBackend> Drop for Multiplexer<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
