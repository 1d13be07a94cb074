//! Logging setup: one console sink and one append-only log file.
//!
//! The subscriber is installed as the default for the calling thread only and
//! stays active for as long as the returned [`LogHandle`] lives.

use std::{
    fs::{self, OpenOptions},
    io::{self, IsTerminal},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Default level when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Level or filter directive (e.g. `info`, `certrenew=debug`).
    pub level: &'a str,
    pub log_dir: &'a Path,
    pub log_file: &'a str,
}

/// Keeps the logging subscriber installed. Drop it to uninstall.
pub struct LogHandle {
    log_path: PathBuf,
    _guard: DefaultGuard,
}

impl LogHandle {
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Builds the console and file sinks and installs them for this thread.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created.
pub fn init_logging(config: &LoggingConfig) -> Result<LogHandle> {
    fs::create_dir_all(config.log_dir)
        .with_context(|| format!("creating log directory {}", config.log_dir.display()))?;

    let log_path = config.log_dir.join(config.log_file);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .without_time();
    let logfile = fmt::layer()
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_target(false);

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(config.level))
        .with(console)
        .with(logfile);

    Ok(LogHandle {
        log_path,
        _guard: tracing::subscriber::set_default(subscriber),
    })
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
