//! Tracing setup.
//!
//! Events go to stdout and are appended to the configured log file, so a
//! restart keeps the history of earlier runs. `RUST_LOG` takes precedence
//! over `logging.level`.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{RelayError, Result};

/// Map a configured level name to a filter; unknown names mean `info`.
fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => LevelFilter::WARN,
        other => other.parse().unwrap_or(LevelFilter::INFO),
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level_filter(level).into())
        .from_env_lossy()
}

/// Open `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber writing to stdout and the log file.
///
/// Fails if the file cannot be opened or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let log_file = Arc::new(open_log_file(Path::new(&config.file))?);

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout.and(log_file))
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| RelayError::Config(format!("cannot install logger: {e}")))
}

/// Install a stdout-only subscriber.
///
/// Fallback when [`init`] fails. Does nothing if a subscriber is already set.
pub fn init_console_only(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
