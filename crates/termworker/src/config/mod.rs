//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of environment variables that override settings
const ENV_PREFIX: &str = "TERM_WORKER";

/// Worker settings, layered from defaults, a TOML file and the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shell used when a create request names none
    pub default_shell: Option<String>,
    /// Value of `TERM` inside every session
    pub term: String,
    /// Size of a single PTY read
    pub read_buffer_size: usize,
    /// Log to this file instead of stderr
    pub log_file: Option<PathBuf>,
    /// Filter directive, e.g. `term_worker=debug`
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_shell: None,
            term: "xterm-256color".to_string(),
            read_buffer_size: 4096,
            log_file: None,
            log_level: None,
        }
    }
}

pub struct SettingsManager;

impl SettingsManager {
    /// Get the worker home directory (~/.config/term-worker)
    pub fn worker_home() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("TERM_WORKER_HOME") {
            return Ok(PathBuf::from(path));
        }
        let base = dirs::config_dir().context("Could not find config directory")?;
        Ok(base.join("term-worker"))
    }

    /// Get the default settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::worker_home()?.join("config.toml"))
    }

    /// Load settings.
    ///
    /// An explicit `path` must exist; the default settings file is optional.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        Self::load_with_env(path, None)
    }

    /// Load settings, reading overrides from `env` instead of the process
    /// environment when given.
    fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Settings> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => {
                let default_path = Self::settings_path()?;
                config::File::from(default_path.as_path()).required(false)
            }
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to read settings")?
            .try_deserialize::<Settings>()
            .context("Failed to parse settings")?;

        if settings.read_buffer_size == 0 {
            anyhow::bail!("read_buffer_size must be greater than zero");
        }

        Ok(settings)
    }
}
