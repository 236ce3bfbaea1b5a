//! Terminal worker
//!
//! Hosts any number of interactive shell sessions on pseudo-terminals and
//! multiplexes them over one JSON-lines channel on stdin/stdout. Logs go to
//! stderr or a file, never to stdout.

mod config;
mod pty;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use config::{Settings, SettingsManager};
use pty::PortablePtyBackend;

#[derive(Parser)]
#[command(name = "term-worker")]
#[command(author, version, about = "Multiplexes PTY shell sessions over stdin/stdout", long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.config/term-worker/config.toml)
    #[arg(short, long, env = "TERM_WORKER_CONFIG")]
    config: Option<PathBuf>,

    /// Shell for sessions created without one
    #[arg(long)]
    shell: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    // Log crashes before the process dies
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("[FATAL] {:#}", e);
            std::process::exit(1);
        }
    };

    let guard = match init_logging(&settings, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("[FATAL] Failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting term-worker v{} (pid {})",
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );

    let code = match worker::run_stdio(PortablePtyBackend::new(&settings)).await {
        Ok(()) => {
            info!("Worker stopped");
            0
        }
        Err(e) => {
            error!("Worker failed: {:#}", e);
            eprintln!("[FATAL] {:#}", e);
            1
        }
    };

    // Flush file logs, then exit without waiting on the blocking stdin reader
    drop(guard);
    std::process::exit(code);
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = SettingsManager::load(cli.config.as_deref())?;
    if let Some(shell) = &cli.shell {
        settings.default_shell = Some(shell.clone());
    }
    if let Some(log_file) = &cli.log_file {
        settings.log_file = Some(log_file.clone());
    }
    Ok(settings)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the settings file, which wins over `--verbose`.
fn init_logging(settings: &Settings, verbose: bool) -> Result<Option<WorkerGuard>> {
    let default_directive = settings.log_level.clone().unwrap_or_else(|| {
        if verbose {
            "term_worker=debug,termworker_core=debug".to_string()
        } else {
            "term_worker=info,termworker_core=info".to_string()
        }
    });
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_directive))
        .context("Invalid log filter")?;

    match &settings.log_file {
        Some(path) => {
            let (dir, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(true)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
            Ok(None)
        }
    }
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log path {} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_shell = \"/bin/zsh\"\n").unwrap();

        let cli = Cli::parse_from([
            "term-worker",
            "--config",
            path.to_str().unwrap(),
            "--shell",
            "/bin/bash",
            "--log-file",
            "worker.log",
        ]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.default_shell.as_deref(), Some("/bin/bash"));
        assert_eq!(settings.log_file, Some(PathBuf::from("worker.log")));
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("worker.log")).unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "worker.log");

        let (dir, name) = split_log_path(Path::new("/var/log/tw/worker.log")).unwrap();
        assert_eq!(dir, Path::new("/var/log/tw"));
        assert_eq!(name, "worker.log");

        assert!(split_log_path(Path::new("/")).is_err());
    }
}
