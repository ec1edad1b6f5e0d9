//! Cross-platform utilities and helpers
//!
//! This module provides the filesystem primitives the update pipeline builds
//! on and the logging setup for the agent binary. All utilities are designed
//! to work consistently across Windows, macOS, and Linux.
//!
//! # Modules
//!
//! - [`fs`] - File system operations with atomic writes, tree copy/move, and
//!   traversal-safe path checks
//! - [`logging`] - Tracing subscriber setup writing to stdout and the
//!   persistent log file
//!
//! # Example
//!
//! ```rust,no_run
//! use updraft_agent::utils::{ensure_dir, atomic_write};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("/opt/myapp.backups"))?;
//! atomic_write(Path::new("/opt/myapp/version.txt"), b"2.1.0\n")?;
//! # Ok(())
//! # }
//! ```

pub mod fs;
pub mod logging;

pub use fs::{
    DirStats, atomic_write, copy_dir, dir_stats, ensure_dir, ensure_parent_dir, is_safe_path,
    move_dir, normalize_path, remove_dir_all, safe_write,
};
pub use logging::init_logging;
