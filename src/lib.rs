//! Updraft - a standalone self-update agent
//!
//! Updraft updates one installed application in place: it fetches a
//! versioned zip package from a configured HTTP endpoint, verifies the
//! archive, snapshots the current installation, stops the running
//! application, and swaps the new tree into the installation root. A
//! failed swap rolls the installation back to the most recent backup.
//! The agent is driven by a scheduler or bootstrapper that consumes its
//! exit code (0 success, 1 failure) and reads its logs afterwards.
//!
//! # Architecture Overview
//!
//! One update is one linear transaction:
//!
//! ```text
//! FETCH -> VERIFY -> BACKUP -> STOP_TARGET -> APPLY -> DONE
//!                    (best    (best           |
//!                    effort)  effort)         +-- failure -> ROLLBACK
//! ```
//!
//! - Fetch, verify, and extract failures abort with the installation
//!   untouched; no rollback is needed or attempted.
//! - Backup and stop failures are logged and tolerated unless the
//!   `require_backup` / `require_stop` policies make them fatal.
//! - Only a failed swap triggers rollback, and the run still reports
//!   failure after a successful rollback.
//! - All scratch state lives in a per-run workspace that is deleted on
//!   every exit path.
//!
//! # Core Modules
//!
//! ## The transaction
//! - [`orchestrator`] - sequences the update transaction end to end
//! - [`fetch`] - downloads the package from the configured endpoint
//! - [`verify`] - size, structure, and CRC checks on the archive
//! - [`backup`] - timestamped snapshots of the live tree, and rollback
//! - [`process`] - locating and gracefully stopping the target application
//! - [`apply`] - extraction and the stage/quarantine/promote swap
//!
//! ## Supporting modules
//! - [`cli`] - command-line interface (`update`, `rollback`, `status`)
//! - [`config`] - TOML configuration at `~/.updraft/config.toml`
//! - [`core`] - error taxonomy and user-facing error rendering
//! - [`version`] - the `version.txt` contract with foreign tooling
//! - [`workspace`] - per-run scratch directories and the instance lock
//! - [`utils`] - filesystem helpers shared across the crate
//!
//! # Configuration Example
//!
//! ```toml
//! [endpoint]
//! package_url_template = "https://releases.example.com/packages/{version}.zip"
//! timeout_secs = 300
//!
//! [policies]
//! require_backup = false
//! require_stop = false
//!
//! [process]
//! signature = "acme-app"
//! pid_file = "acme-app.pid"
//!
//! [paths]
//! backups_dir = "~/backups/acme-app"
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Update an installation to a specific version
//! updraft update 2.1.0 --install-root /opt/acme/app
//!
//! # Restore the previous state after a bad release
//! updraft rollback --install-root /opt/acme/app
//!
//! # Inspect an installation
//! updraft status --install-root /opt/acme/app
//! ```

// The update transaction
pub mod apply;
pub mod backup;
pub mod fetch;
pub mod orchestrator;
pub mod process;
pub mod verify;

// Supporting modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod utils;
pub mod version;
pub mod workspace;
