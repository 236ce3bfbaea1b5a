//! Worker loop: one controller channel, many terminal sessions
//!
//! Inbound JSON lines are decoded into commands and fed to the multiplexer.
//! Outbound events are written back as JSON lines by a dedicated task.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use termworker_core::codec::{decode_command, encode_event};
use termworker_core::{Event, Multiplexer, PtyBackend};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, info, warn};

/// Serve the controller on stdin/stdout until it hangs up or a termination
/// signal arrives.
pub async fn run_stdio<B: PtyBackend>(backend: B) -> Result<()> {
    serve(
        backend,
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await
}

/// Serve one controller channel.
///
/// Returns once `input` reaches EOF or `shutdown` completes. Every session is
/// killed before returning and all pending events are flushed to `output`.
pub async fn serve<B, R, W, F>(backend: B, input: R, output: W, shutdown: F) -> Result<()>
where
    B: PtyBackend,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
    F: Future<Output = ()>,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_events(events_rx, output));

    let mut multiplexer = Multiplexer::new(backend, events_tx.clone());

    // Undecodable lines are answered on the same channel so they stay ordered
    // with the multiplexer's own events
    let commands = FramedRead::new(input, LinesCodec::new()).filter_map(move |line| {
        let events_tx = events_tx.clone();
        async move {
            let reply = match line {
                Ok(line) if line.trim().is_empty() => return None,
                Ok(line) => match decode_command(&line) {
                    Ok(command) => return Some(command),
                    Err(e) => {
                        warn!("Rejected controller message: {}", e);
                        e.into_event()
                    }
                },
                Err(e) => {
                    warn!("Failed to read controller channel: {}", e);
                    Event::error("", e)
                }
            };
            let _ = events_tx.send(reply);
            None
        }
    });

    let interrupted = tokio::select! {
        _ = multiplexer.run(commands) => false,
        _ = shutdown => true,
    };

    if interrupted {
        info!("Termination requested, closing all sessions");
        multiplexer.shutdown();
    }

    // Last sender goes away here, which lets the writer drain and finish
    drop(multiplexer);

    writer.await.context("Event writer task failed")??;
    debug!("Event writer finished");
    Ok(())
}

async fn write_events<W>(mut events: mpsc::UnboundedReceiver<Event>, output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(output, LinesCodec::new());

    while let Some(event) = events.recv().await {
        let line = match encode_event(&event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode event for session {}: {}", event.id(), e);
                continue;
            }
        };
        sink.send(line)
            .await
            .context("Failed to write to controller channel")?;
    }

    Ok(())
}

/// Completes on Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
