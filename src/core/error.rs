//! Error handling for Updraft
//!
//! This module provides comprehensive error types and user-friendly error reporting for the
//! Updraft update agent. The error system is designed around two core principles:
//! 1. **Strongly-typed errors** for precise error handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! The error system consists of two main types:
//! - [`UpdraftError`] - Enumerated error types for all failure cases in an update run
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! # Error Severity
//!
//! Update-run errors fall into distinct severity classes that drive how the
//! orchestrator reacts:
//! - **Abort, nothing touched**: [`UpdraftError::TransportError`],
//!   [`UpdraftError::DownloadTimeout`], [`UpdraftError::IntegrityError`] - the run
//!   stops before the installation is modified in any way.
//! - **Degraded, run continues**: [`UpdraftError::BackupError`],
//!   [`UpdraftError::ProcessStopError`] - logged and tolerated by default, fatal
//!   only when the corresponding policy switch is enabled.
//! - **Fatal with recovery**: [`UpdraftError::ApplyError`] - the swap failed and
//!   the rollback path runs; the run result is still a failure.
//! - **Manual intervention**: [`UpdraftError::RollbackError`] - the rollback
//!   itself failed and the installation may be inconsistent.
//!
//! # Error Conversion and Context
//!
//! Common library errors are automatically converted to Updraft errors:
//! - [`std::io::Error`] → [`UpdraftError::IoError`]
//! - [`toml::de::Error`] → [`UpdraftError::TomlError`]
//! - [`semver::Error`] → [`UpdraftError::SemverError`]
//! - [`serde_json::Error`] → [`UpdraftError::JsonError`]
//! - [`zip::result::ZipError`] → [`UpdraftError::ArchiveError`]
//! - [`reqwest::Error`] → [`UpdraftError::HttpError`]
//!
//! Use [`user_friendly_error`] to convert any error into a user-friendly format with
//! contextual suggestions.
//!
//! # Examples
//!
//! ## Basic Error Handling
//!
//! ```rust,no_run
//! use updraft_agent::core::{UpdraftError, user_friendly_error};
//!
//! fn download_release() -> Result<(), UpdraftError> {
//!     Err(UpdraftError::TransportError {
//!         url: "https://releases.example.com/packages/2.1.0.zip".to_string(),
//!         reason: "connection refused".to_string(),
//!     })
//! }
//!
//! match download_release() {
//!     Ok(_) => println!("Success!"),
//!     Err(e) => {
//!         let ctx = user_friendly_error(anyhow::Error::from(e));
//!         ctx.display(); // Shows colored error with suggestions
//!     }
//! }
//! ```
//!
//! ## Creating Error Context Manually
//!
//! ```rust,no_run
//! use updraft_agent::core::{UpdraftError, ErrorContext};
//!
//! let error = UpdraftError::NoBackupFound {
//!     dir: "/opt/myapp.backups".to_string(),
//! };
//! let context = ErrorContext::new(error)
//!     .with_suggestion("Run an update first so a snapshot exists to restore")
//!     .with_details("Rollback restores the newest snapshot under the backups directory");
//!
//! // Display with colors in terminal
//! context.display();
//!
//! // Or get as string for logging
//! let message = format!("{}", context);
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for Updraft operations
///
/// This enum represents all possible errors that can occur during an update run.
/// Each variant is designed to provide specific context about the failure and enable
/// appropriate error handling strategies.
///
/// # Design Philosophy
///
/// - **Specific Error Types**: Each variant represents a specific failure mode
/// - **Rich Context**: Errors include relevant details like paths, URLs, and reasons
/// - **User-Friendly**: Error messages are written for operators, not just developers
/// - **Actionable**: Most errors provide clear guidance on how to resolve the issue
///
/// # Examples
///
/// ## Pattern Matching on Errors
///
/// ```rust,no_run
/// use updraft_agent::core::UpdraftError;
///
/// fn handle_error(error: UpdraftError) {
///     match error {
///         UpdraftError::RollbackError { .. } => {
///             eprintln!("Manual intervention required");
///             std::process::exit(1);
///         }
///         UpdraftError::UpdateInProgress { .. } => {
///             eprintln!("Another update is running; try again later");
///         }
///         UpdraftError::TransportError { url, .. } => {
///             eprintln!("Download from {} failed: check your connection", url);
///         }
///         _ => {
///             eprintln!("Unexpected error: {}", error);
///         }
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum UpdraftError {
    /// Package download failed
    ///
    /// This error occurs when the release package cannot be retrieved from the
    /// download endpoint. Common causes are connection failures, DNS problems,
    /// and non-success HTTP status codes. The installation is untouched.
    ///
    /// # Fields
    /// - `url`: The download URL that failed
    /// - `reason`: Description of the transport failure
    #[error("Failed to download package from {url}")]
    TransportError {
        /// The download URL that failed
        url: String,
        /// Description of the transport failure
        reason: String,
    },

    /// Package download exceeded the transfer deadline
    ///
    /// Distinguished from other transport failures because the fix is different:
    /// a timeout usually means a slow host or a large package, not a broken
    /// endpoint. The installation is untouched.
    ///
    /// # Fields
    /// - `url`: The download URL that timed out
    /// - `timeout_secs`: The deadline that was exceeded, in seconds
    #[error("Download from {url} timed out after {timeout_secs}s")]
    DownloadTimeout {
        /// The download URL that timed out
        url: String,
        /// The deadline that was exceeded, in seconds
        timeout_secs: u64,
    },

    /// Downloaded package failed integrity validation
    ///
    /// The archive is missing, implausibly small, or structurally corrupt
    /// (unreadable entry table or entries that fail their checksums). The run
    /// aborts before the installation is modified.
    ///
    /// # Fields
    /// - `path`: Path to the rejected archive
    /// - `reason`: Why validation rejected it
    #[error("Package integrity check failed for {path}")]
    IntegrityError {
        /// Path to the rejected archive
        path: String,
        /// Why validation rejected it
        reason: String,
    },

    /// Snapshot of the live installation failed
    ///
    /// Tolerated by default: the run logs the failure and continues without a
    /// fresh backup. The `require_backup` policy switch turns this into a fatal
    /// error instead.
    ///
    /// # Fields
    /// - `path`: The path involved in the failed snapshot
    /// - `reason`: Why the snapshot failed
    #[error("Backup failed for {path}")]
    BackupError {
        /// The path involved in the failed snapshot
        path: String,
        /// Why the snapshot failed
        reason: String,
    },

    /// Stopping the target application failed
    ///
    /// Tolerated by default: a process that cannot be found or refuses to exit
    /// is logged and skipped. The `require_stop` policy switch turns this into
    /// a fatal error instead.
    ///
    /// # Fields
    /// - `target`: The process signature or PID that could not be stopped
    /// - `reason`: Why the stop failed
    #[error("Failed to stop target process '{target}'")]
    ProcessStopError {
        /// The process signature or PID that could not be stopped
        target: String,
        /// Why the stop failed
        reason: String,
    },

    /// Extraction or swap of the new tree failed
    ///
    /// Fatal: the orchestrator invokes rollback from the most recent backup.
    /// The run result is a failure even when the rollback succeeds.
    ///
    /// # Fields
    /// - `step`: The apply step that failed ("extract", "stage", "quarantine", "promote", "discard")
    /// - `reason`: Why the step failed
    #[error("Apply failed during {step}")]
    ApplyError {
        /// The apply step that failed
        step: String,
        /// Why the step failed
        reason: String,
    },

    /// Restoring the installation after a failed apply also failed
    ///
    /// The most severe diagnosis this agent can produce: the live tree may be
    /// missing or inconsistent and must be repaired by hand from the snapshots
    /// under the backups directory.
    ///
    /// # Fields
    /// - `reason`: Why the restore failed
    #[error("Rollback failed, manual intervention required: {reason}")]
    RollbackError {
        /// Why the restore failed
        reason: String,
    },

    /// No usable backup snapshot exists
    ///
    /// Returned by restore operations when the backups directory is missing,
    /// empty, or contains no parseable metadata records. Nothing is modified.
    ///
    /// # Fields
    /// - `dir`: The backups directory that was scanned
    #[error("No usable backup found in {dir}")]
    NoBackupFound {
        /// The backups directory that was scanned
        dir: String,
    },

    /// Another update run holds the instance lock
    ///
    /// Two concurrent runs against the same installation would corrupt it;
    /// the second run fails fast instead of queueing.
    ///
    /// # Fields
    /// - `path`: The lock file that is already held
    #[error("Another update is already in progress (lock: {path})")]
    UpdateInProgress {
        /// The lock file that is already held
        path: String,
    },

    /// Target version identifier is not a valid semantic version
    ///
    /// # Fields
    /// - `version`: The rejected version string
    #[error("Invalid version identifier: {version}")]
    InvalidVersion {
        /// The rejected version string
        version: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Semver parsing error
    #[error("Semver parsing error: {0}")]
    SemverError(#[from] semver::Error),

    /// JSON error from backup metadata handling
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Archive error from the zip reader
    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for UpdraftError {
    fn clone(&self) -> Self {
        match self {
            Self::TransportError {
                url,
                reason,
            } => Self::TransportError {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::DownloadTimeout {
                url,
                timeout_secs,
            } => Self::DownloadTimeout {
                url: url.clone(),
                timeout_secs: *timeout_secs,
            },
            Self::IntegrityError {
                path,
                reason,
            } => Self::IntegrityError {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::BackupError {
                path,
                reason,
            } => Self::BackupError {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ProcessStopError {
                target,
                reason,
            } => Self::ProcessStopError {
                target: target.clone(),
                reason: reason.clone(),
            },
            Self::ApplyError {
                step,
                reason,
            } => Self::ApplyError {
                step: step.clone(),
                reason: reason.clone(),
            },
            Self::RollbackError {
                reason,
            } => Self::RollbackError {
                reason: reason.clone(),
            },
            Self::NoBackupFound {
                dir,
            } => Self::NoBackupFound {
                dir: dir.clone(),
            },
            Self::UpdateInProgress {
                path,
            } => Self::UpdateInProgress {
                path: path.clone(),
            },
            Self::InvalidVersion {
                version,
            } => Self::InvalidVersion {
                version: version.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // For errors that don't implement Clone, convert to Other
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::SemverError(e) => Self::Other {
                message: format!("Semver parsing error: {e}"),
            },
            Self::JsonError(e) => Self::Other {
                message: format!("JSON error: {e}"),
            },
            Self::ArchiveError(e) => Self::Other {
                message: format!("Archive error: {e}"),
            },
            Self::HttpError(e) => Self::Other {
                message: format!("HTTP error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// `ErrorContext` wraps an [`UpdraftError`] and adds optional user-friendly messages,
/// suggestions for resolution, and additional details. This is the primary way
/// Updraft presents errors to CLI users.
///
/// # Display Format
///
/// When displayed, errors show:
/// 1. **Error**: The main error message in red
/// 2. **Details**: Additional context about the error in yellow (optional)
/// 3. **Suggestion**: Actionable steps to resolve the issue in green (optional)
///
/// # Examples
///
/// ```rust,no_run
/// use updraft_agent::core::{UpdraftError, ErrorContext};
///
/// let error = UpdraftError::UpdateInProgress {
///     path: "/opt/myapp.backups/.updraft.lock".to_string(),
/// };
/// let context = ErrorContext::new(error)
///     .with_suggestion("Wait for the other run to finish, or remove the lock file if it is stale")
///     .with_details("Only one update may run against an installation at a time");
///
/// // Display to terminal with colors
/// context.display();
///
/// // Or convert to string for logging
/// let message = context.to_string();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying Updraft error
    pub error: UpdraftError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from an [`UpdraftError`]
    ///
    /// This creates a basic error context with no additional suggestions or details.
    /// Use the builder methods [`with_suggestion`] and [`with_details`] to add
    /// user-friendly information.
    ///
    /// [`with_suggestion`]: ErrorContext::with_suggestion
    /// [`with_details`]: ErrorContext::with_details
    #[must_use]
    pub const fn new(error: UpdraftError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    ///
    /// Suggestions should be actionable steps that operators can take to resolve
    /// the error. They are displayed in green in the terminal to draw attention.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    ///
    /// Details provide context about why the error occurred or what it means.
    /// They are displayed in yellow in the terminal, less prominent than the
    /// main error or suggestion.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// This method prints the error, details, and suggestion to stderr using
    /// color coding:
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    ///
    /// This is the primary way Updraft presents errors to users in the CLI.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// This function is the main entry point for converting arbitrary errors into
/// user-friendly error messages for CLI display. It recognizes common error types
/// and provides appropriate context and suggestions.
///
/// # Error Recognition
///
/// The function recognizes and provides specific handling for:
/// - [`UpdraftError`] variants with tailored suggestions
/// - [`std::io::Error`] with filesystem-specific guidance
/// - [`toml::de::Error`] with configuration syntax help
/// - Generic errors with the full error chain appended
///
/// # Examples
///
/// ```rust,no_run
/// use updraft_agent::core::{UpdraftError, user_friendly_error};
///
/// let error = UpdraftError::RollbackError {
///     reason: "restore copy failed".to_string(),
/// };
/// let context = user_friendly_error(anyhow::Error::from(error));
///
/// context.display(); // Shows manual-recovery guidance
/// ```
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    // Check for specific error types and provide helpful suggestions
    if let Some(updraft_error) = error.downcast_ref::<UpdraftError>() {
        return create_error_context(updraft_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(UpdraftError::Other {
                    message: format!("Permission denied: {io_error}"),
                })
                .with_suggestion("Run the agent with a user that owns the installation root and backups directory")
                .with_details("Swapping an installation requires write access to the install root, its parent, and the backups directory");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(UpdraftError::Other {
                    message: format!("File not found: {io_error}"),
                })
                .with_suggestion("Check that the installation root path is correct and exists")
                .with_details("This error occurs when a required file or directory cannot be found");
            }
            std::io::ErrorKind::StorageFull => {
                return ErrorContext::new(UpdraftError::Other {
                    message: format!("Disk full: {io_error}"),
                })
                .with_suggestion("Free disk space, then re-run the update; old snapshots under the backups directory can be pruned")
                .with_details("An update needs room for the download, the staged copy, and one snapshot of the installation");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdraftError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax in your config file. Verify quotes, brackets, and section headers")
        .with_details("TOML parsing errors are usually caused by syntax issues like missing quotes or mismatched brackets");
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();

    // Append error chain if available
    let chain: Vec<String> = error
        .chain()
        .skip(1) // Skip the root cause which is already in to_string()
        .map(std::string::ToString::to_string)
        .collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdraftError::Other {
        message,
    })
}

/// Create appropriate [`ErrorContext`] with suggestions for specific Updraft errors
///
/// This internal function maps each [`UpdraftError`] variant to an appropriate
/// [`ErrorContext`] with tailored suggestions and details. It's used by
/// [`user_friendly_error`] to provide consistent, helpful error messages.
fn create_error_context(error: UpdraftError) -> ErrorContext {
    match &error {
        UpdraftError::TransportError { url, reason } => {
            ErrorContext::new(UpdraftError::TransportError {
                url: url.clone(),
                reason: reason.clone(),
            })
            .with_suggestion(
                "Check your internet connection and that the download endpoint is reachable. \
                 Verify the package URL template in your config matches the release host",
            )
            .with_details(format!("Transport failure: {reason}. The installation was not modified"))
        }

        UpdraftError::DownloadTimeout { url, timeout_secs } => {
            ErrorContext::new(UpdraftError::DownloadTimeout {
                url: url.clone(),
                timeout_secs: *timeout_secs,
            })
            .with_suggestion(format!(
                "Retry on a faster connection, or raise timeout_secs above {timeout_secs} in the [endpoint] config section"
            ))
            .with_details(format!(
                "The transfer from {url} did not complete within the deadline. The installation was not modified"
            ))
        }

        UpdraftError::IntegrityError { path, reason } => {
            ErrorContext::new(UpdraftError::IntegrityError {
                path: path.clone(),
                reason: reason.clone(),
            })
            .with_suggestion(
                "Re-run the update; a fresh download usually clears transient corruption. \
                 If it fails repeatedly, the published package itself is damaged",
            )
            .with_details(format!("Rejected archive at {path}: {reason}"))
        }

        UpdraftError::BackupError { path, reason } => {
            ErrorContext::new(UpdraftError::BackupError {
                path: path.clone(),
                reason: reason.clone(),
            })
            .with_suggestion(
                "Check free disk space and permissions on the backups directory. \
                 Snapshots need as much space as the installation itself",
            )
            .with_details(format!("Snapshot of {path} failed: {reason}"))
        }

        UpdraftError::ProcessStopError { target, reason } => {
            ErrorContext::new(UpdraftError::ProcessStopError {
                target: target.clone(),
                reason: reason.clone(),
            })
            .with_suggestion(format!(
                "Stop '{target}' manually, then re-run the update. A running target can hold files the swap needs to replace"
            ))
            .with_details(format!("Stop attempt failed: {reason}"))
        }

        UpdraftError::ApplyError { step, reason } => {
            ErrorContext::new(UpdraftError::ApplyError {
                step: step.clone(),
                reason: reason.clone(),
            })
            .with_suggestion(
                "Check the rollback result above. If the installation is inconsistent, \
                 run 'updraft rollback' to restore the newest snapshot",
            )
            .with_details(format!("The {step} step failed: {reason}"))
        }

        UpdraftError::RollbackError { reason } => {
            ErrorContext::new(UpdraftError::RollbackError {
                reason: reason.clone(),
            })
            .with_suggestion(
                "Restore the installation by hand: copy the 'tree' directory of the newest \
                 snapshot in the backups directory over the installation root",
            )
            .with_details(
                "Both the update and the automatic restore failed. \
                 The installation root may be missing or partially populated",
            )
        }

        UpdraftError::NoBackupFound { dir } => {
            ErrorContext::new(UpdraftError::NoBackupFound {
                dir: dir.clone(),
            })
            .with_suggestion(format!(
                "Check that {dir} is the right backups directory; snapshots are created during updates, so a never-updated installation has none to restore"
            ))
            .with_details("Rollback selects the snapshot with the newest timestamp; none were usable")
        }

        UpdraftError::UpdateInProgress { path } => {
            ErrorContext::new(UpdraftError::UpdateInProgress {
                path: path.clone(),
            })
            .with_suggestion(format!(
                "Wait for the other run to finish. If no other agent is running, delete the stale lock file at {path}"
            ))
            .with_details("Concurrent updates against one installation would corrupt it, so the second run fails fast")
        }

        UpdraftError::InvalidVersion { version } => {
            ErrorContext::new(UpdraftError::InvalidVersion {
                version: version.clone(),
            })
            .with_suggestion("Pass a semantic version such as 2.1.0")
            .with_details(format!("'{version}' does not parse as MAJOR.MINOR.PATCH"))
        }

        UpdraftError::ConfigError { message } => {
            ErrorContext::new(UpdraftError::ConfigError {
                message: message.clone(),
            })
            .with_suggestion("Check your config file syntax and section names ([endpoint], [policies], [process], [paths])")
            .with_details("Configuration is read from ~/.updraft/config.toml unless --config points elsewhere")
        }

        _ => ErrorContext::new(error.clone()),
    }
}
