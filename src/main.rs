//! updraft CLI entry point
//!
//! This is the main executable for the updraft self-update agent.
//! It handles command-line argument parsing, error display, and command
//! execution.
//!
//! The CLI supports three commands:
//! - `update` - fetch, verify, and install an update package
//! - `rollback` - restore the installation from the most recent backup
//! - `status` - show installed version, tree size, and backups

use anyhow::Result;
use clap::Parser;
use updraft_agent::cli;
use updraft_agent::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    // Execute the command; the scheduler driving this binary keys off
    // the exit code alone.
    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            // Convert to user-friendly error with context and suggestions
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
