//! Logging initialization for the agent binary.
//!
//! Update runs are unattended: the scheduler that launched the agent is long
//! gone by the time an operator investigates a failure. Every run therefore
//! writes human-readable, timestamped lines both to standard output and to a
//! persistent log file, and operators diagnose failed updates from that file
//! alone.
//!
//! The subscriber is a single `tracing_subscriber::fmt` layer with an
//! environment filter. `RUST_LOG` overrides the CLI verbosity when set, which
//! keeps ad-hoc debugging possible without touching config.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Initializes the global tracing subscriber.
///
/// Output goes to stdout, and additionally to `log_file` when one is
/// configured. ANSI styling is disabled so the log file stays readable in a
/// pager. A log file that cannot be opened degrades to stdout-only logging
/// with a warning; an unattended update must not die over a missing log
/// directory.
///
/// # Arguments
///
/// * `default_level` - Filter directive used when `RUST_LOG` is not set
///   (typically "error", "info", or "debug")
/// * `log_file` - Optional path of the persistent log file, appended to
///
/// # Errors
///
/// Returns an error only when the subscriber is already set, which indicates
/// a double initialization bug in the caller.
pub fn init_logging(default_level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let file = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("warning: could not open log file {}: {e:#}", path.display());
            None
        }
    });

    match file {
        Some(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stdout.and(Arc::new(file)))
                .with_ansi(false)
                .with_target(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stdout)
                .with_ansi(false)
                .with_target(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
        }
    }

    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    crate::utils::fs::ensure_parent_dir(path)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}
