//! Command-line interface for the updraft self-update agent.
//!
//! Three subcommands cover the agent's whole surface:
//!
//! - `update` - run the update transaction against an installation
//! - `rollback` - restore the most recent backup on operator demand
//! - `status` - show installed version, tree size, and backups
//!
//! # Usage
//!
//! ```bash
//! # Update an installation to a specific version
//! updraft update 2.1.0 --install-root /opt/acme/app
//!
//! # Put it back the way it was
//! updraft rollback --install-root /opt/acme/app
//!
//! # See what is installed and what can be restored
//! updraft status --install-root /opt/acme/app
//! ```
//!
//! # Global Options
//!
//! All subcommands accept:
//! - `--verbose` - debug-level logging
//! - `--quiet` - errors only
//! - `--config <PATH>` - config file other than `~/.updraft/config.toml`
//!   (also read from the `UPDRAFT_CONFIG` environment variable)
//!
//! `RUST_LOG`, when set, overrides the verbosity flags entirely.
//!
//! # Logging
//!
//! Log lines go to standard output and are appended to the persistent
//! log file (`~/.updraft/updraft.log` unless `paths.log_file` says
//! otherwise), so the trail of an unattended run survives the terminal.
//! A log file that cannot be opened degrades to stdout-only logging
//! with a warning rather than blocking the run.

pub mod rollback;
pub mod status;
pub mod update;

use crate::config::AgentConfig;
use crate::utils::logging::init_logging;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level argument parser for the `updraft` binary.
#[derive(Parser)]
#[command(
    name = "updraft",
    about = "Self-update agent for managed application installations",
    version,
    long_about = "Updraft fetches, verifies, and installs application update packages, \
with automatic backup and rollback around the file swap."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output.
    ///
    /// Equivalent to `RUST_LOG=debug`. Mutually exclusive with `--quiet`.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the config file.
    ///
    /// Defaults to `~/.updraft/config.toml`; a missing file means
    /// built-in defaults.
    #[arg(short, long, global = true, env = "UPDRAFT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Fetch, verify, and install an update package.
    ///
    /// See [`update::UpdateCommand`] for the transaction's steps and the
    /// policy switches.
    Update(update::UpdateCommand),

    /// Restore the installation from the most recent backup.
    ///
    /// See [`rollback::RollbackCommand`].
    Rollback(rollback::RollbackCommand),

    /// Show installed version, tree size, and available backups.
    ///
    /// See [`status::StatusCommand`].
    Status(status::StatusCommand),
}

impl Cli {
    /// Load configuration, initialize logging, and run the subcommand.
    pub async fn execute(self) -> Result<()> {
        let config = AgentConfig::load_with_optional(self.config.clone()).await?;
        init_logging(self.default_log_level(), config.log_file_path().as_deref())?;

        match self.command {
            Commands::Update(cmd) => cmd.execute(config).await,
            Commands::Rollback(cmd) => cmd.execute(config).await,
            Commands::Status(cmd) => cmd.execute(config).await,
        }
    }

    /// Filter directive used when `RUST_LOG` is not set.
    fn default_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}
