//! Global constants used throughout the Updraft codebase.
//!
//! This module contains timeout durations, size thresholds, and fixed
//! file names that are used across multiple modules. Defining them
//! centrally improves maintainability and makes magic numbers more
//! discoverable.

use std::time::Duration;

/// Name of the version descriptor file under the installation root.
///
/// The file holds a single semantic-version line and is read and written
/// by tooling outside this agent as well; the name and format are a
/// compatibility contract and must not change.
pub const VERSION_FILE_NAME: &str = "version.txt";

/// Name of the metadata record written next to each backup snapshot.
pub const BACKUP_METADATA_FILE: &str = "backup.json";

/// Name of the lock file that serializes runs against one installation.
///
/// Lives under the backups root so it survives workspace cleanup and is
/// shared by every run targeting the same installation.
pub const INSTANCE_LOCK_FILE: &str = ".updraft.lock";

/// Name of the directory inside a snapshot that holds the copied tree.
pub const BACKUP_TREE_DIR: &str = "tree";

/// Overall timeout for downloading a release package (300 seconds).
///
/// Covers the whole transfer, not just connection establishment. Release
/// packages are tens of megabytes and update hosts can be slow, so this
/// is deliberately generous; a hung transfer must still fail the run
/// rather than block it forever.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Minimum plausible size for a release package (1 KiB).
///
/// Anything smaller is an error page or a truncated transfer, never a
/// real application archive.
pub const MIN_PACKAGE_SIZE_BYTES: u64 = 1024;

/// How long to wait for one target process to exit after a graceful
/// termination request (10 seconds).
///
/// A process that ignores the request past this window is skipped, not
/// force-killed; the swap proceeds and may fail on locked files, which
/// the rollback path then handles.
pub const PROCESS_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for a terminated process to exit.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Settle delay after the stop pass (3 seconds).
///
/// Gives the OS time to release file handles held by just-exited
/// processes before the swap starts renaming directories.
pub const PROCESS_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Number of attempts for the restore copy during rollback.
///
/// Antivirus scanners and lingering handles can hold paths briefly after
/// the target exits; a short fixed-interval retry rides that out.
pub const RESTORE_ATTEMPTS: usize = 3;

/// Delay between restore attempts.
pub const RESTORE_RETRY_DELAY: Duration = Duration::from_secs(1);
