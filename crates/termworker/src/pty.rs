//! portable-pty implementation of the PTY port
//!
//! Each spawned session gets two threads: a reader that forwards output to
//! the session's listener and reports the exit status once the PTY closes,
//! and a writer that drains queued input so the multiplexer never blocks on
//! a full PTY buffer.

use bytes::Bytes;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use termworker_core::{
    ExitInfo, PtyBackend, PtyListener, PtyProcess, Result, SpawnSpec, TermError, TermSize,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Settings;

/// Spawns sessions on the operating system's native PTY
#[derive(Debug, Clone)]
pub struct PortablePtyBackend {
    default_shell: Option<String>,
    term: String,
    read_buffer_size: usize,
}

impl PortablePtyBackend {
    pub fn new(settings: &Settings) -> Self {
        Self {
            default_shell: settings.default_shell.clone(),
            term: settings.term.clone(),
            read_buffer_size: settings.read_buffer_size.max(1),
        }
    }

    fn resolve_shell(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_string)
            .or_else(|| self.default_shell.clone())
            .unwrap_or_else(default_shell)
    }
}

impl Default for PortablePtyBackend {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl PtyBackend for PortablePtyBackend {
    fn spawn(&self, spec: &SpawnSpec, listener: PtyListener) -> Result<Box<dyn PtyProcess>> {
        let shell = self.resolve_shell(spec.shell.as_deref());
        let fail = |reason: String| TermError::SpawnFailure {
            shell: shell.clone(),
            reason,
        };

        let pair = native_pty_system()
            .openpty(pty_size(spec.size))
            .map_err(|e| fail(format!("failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(&shell);
        if let Some(cwd) = spec.cwd.clone().or_else(dirs::home_dir) {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", &self.term);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| fail(format!("failed to spawn command: {}", e)))?;
        // Only the child may hold the slave, otherwise reads never hit EOF
        drop(pair.slave);

        let pid = child.process_id();
        let mut killer = child.clone_killer();

        let io = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match io {
            Ok(io) => io,
            Err(e) => {
                let _ = child.kill();
                return Err(fail(format!("failed to open PTY streams: {}", e)));
            }
        };

        let input = match spawn_writer(listener.id(), writer) {
            Ok(input) => input,
            Err(e) => {
                let _ = child.kill();
                return Err(fail(format!("failed to start writer thread: {}", e)));
            }
        };

        let exited = Arc::new(AtomicBool::new(false));
        if let Err(e) = spawn_reader(
            reader,
            child,
            listener,
            exited.clone(),
            self.read_buffer_size,
        ) {
            let _ = killer.kill();
            return Err(fail(format!("failed to start reader thread: {}", e)));
        }

        Ok(Box::new(PortablePty {
            master: pair.master,
            input,
            killer,
            exited,
            pid,
        }))
    }
}

/// A live process on a native PTY
pub struct PortablePty {
    master: Box<dyn MasterPty + Send>,
    input: mpsc::UnboundedSender<Vec<u8>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    /// Set by the reader thread before it reaps the child
    exited: Arc<AtomicBool>,
    pid: Option<u32>,
}

impl PtyProcess for PortablePty {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.input
            .send(data.to_vec())
            .map_err(|_| TermError::Pty("input channel closed".to_string()))
    }

    fn resize(&mut self, size: TermSize) -> Result<()> {
        self.master
            .resize(pty_size(size))
            .map_err(|e| TermError::Pty(format!("resize failed: {}", e)))
    }

    fn kill(&mut self) -> Result<()> {
        // After reaping, the pid may already belong to another process
        if self.exited.load(Ordering::Acquire) {
            return Ok(());
        }
        match self.killer.kill() {
            Ok(()) => Ok(()),
            // Reaped between the check and the signal
            Err(_) if self.exited.load(Ordering::Acquire) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

fn spawn_writer(
    id: &str,
    mut writer: Box<dyn Write + Send>,
) -> std::io::Result<mpsc::UnboundedSender<Vec<u8>>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let id = id.to_string();

    std::thread::Builder::new()
        .name(format!("pty-writer-{}", id))
        .spawn(move || {
            while let Some(data) = rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    warn!("PTY write failed for session {}: {}", id, e);
                    break;
                }
            }
        })?;

    Ok(tx)
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    listener: PtyListener,
    exited: Arc<AtomicBool>,
    buffer_size: usize,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-reader-{}", listener.id()))
        .spawn(move || {
            let mut buf = vec![0u8; buffer_size];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break, // EOF
                    Ok(n) => {
                        if !listener.data(Bytes::copy_from_slice(&buf[..n])) {
                            // Nobody will ever remove this session
                            let _ = child.kill();
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // Linux reports EIO once the child side is closed
                        debug!("PTY read ended for session {}: {}", listener.id(), e);
                        break;
                    }
                }
            }

            exited.store(true, Ordering::Release);
            let info = match child.wait() {
                Ok(status) => ExitInfo {
                    code: status.exit_code() as i32,
                    signal: status.signal().map(str::to_string),
                },
                Err(e) => {
                    warn!("Failed to reap session {}: {}", listener.id(), e);
                    ExitInfo::with_code(-1)
                }
            };
            listener.exit(info);
        })?;

    Ok(())
}

fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Returns the user's default shell
fn default_shell() -> String {
    #[cfg(windows)]
    {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }
    #[cfg(not(windows))]
    {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}
