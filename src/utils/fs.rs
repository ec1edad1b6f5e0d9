//! File system utilities for cross-platform file operations
//!
//! This module provides the safe, atomic file operations the update pipeline is
//! built from. All functions handle platform-specific differences such as
//! permissions and rename semantics.
//!
//! # Key Features
//!
//! - **Atomic writes**: Files are written via temp-then-rename to prevent corruption
//! - **Whole-tree operations**: Recursive copy, move, and removal of directory trees
//! - **Safety**: Path traversal prevention for archive extraction
//!
//! # Examples
//!
//! ```rust,no_run
//! use updraft_agent::utils::fs::{ensure_dir, safe_write, dir_stats};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("/opt/myapp.backups"))?;
//! safe_write(Path::new("/opt/myapp/version.txt"), "2.1.0\n")?;
//!
//! let stats = dir_stats(Path::new("/opt/myapp"))?;
//! println!("{} files, {} bytes", stats.files, stats.bytes);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Ensures a directory exists, creating it and all parent directories if necessary.
///
/// # Arguments
///
/// * `path` - The directory path to create
///
/// # Returns
///
/// - `Ok(())` if the directory exists or was successfully created
/// - `Err` if the path exists but is not a directory, or creation fails
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Ensures that the parent directory of a file path exists.
///
/// Convenience for creating the directory structure needed for a file before
/// writing to it. A path with no parent is fine.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

/// Safely writes a string to a file using atomic operations.
///
/// This is a convenience wrapper around [`atomic_write`] that handles
/// string-to-bytes conversion. The file either contains the new content or
/// the old content, never a partial write.
pub fn safe_write(path: &Path, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// This function ensures atomic writes by:
/// 1. Writing content to a temporary file (`.tmp` extension)
/// 2. Syncing the temporary file to disk
/// 3. Atomically renaming the temporary file to the target path
///
/// Foreign readers (the target application reads its own version file) must
/// never observe a partially written file, which a direct write cannot
/// guarantee.
///
/// # Arguments
///
/// * `path` - The target file path
/// * `content` - The raw bytes to write
///
/// # Errors
///
/// Returns an error if any step of the atomic write fails. Parent directories
/// are created automatically.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    ensure_parent_dir(path)?;

    let temp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Recursively copies a directory and all its contents to a new location.
///
/// Performs a deep copy of all files and subdirectories from the source to the
/// destination, creating the destination if needed.
///
/// # Behavior
///
/// - Creates destination directory if it doesn't exist
/// - Recursively copies all subdirectories
/// - Copies only regular files (skips symlinks and special files)
/// - Overwrites existing files in the destination
/// - `fs::copy` carries Unix permission bits over, so executables stay executable
///
/// # Errors
///
/// Returns an error if the copy fails for any file or directory.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "Failed to copy file from {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
        // Skip symlinks and other file types
    }

    Ok(())
}

/// Recursively removes a directory and all its contents.
///
/// Safe to call on non-existent directories; cleanup paths run this without
/// caring whether an earlier step ever created the target.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Moves a directory, preferring a single rename and falling back to copy-then-delete.
///
/// A rename is atomic and cheap but only works within one filesystem. When the
/// rename fails (cross-device moves, some network mounts), the tree is copied
/// recursively and the source removed afterwards.
///
/// # Arguments
///
/// * `src` - The directory to move
/// * `dst` - The destination path (must not already exist as a non-empty directory)
///
/// # Errors
///
/// Returns an error when both the rename and the copy fallback fail. A failed
/// fallback can leave a partial copy at `dst`; callers that need stronger
/// guarantees keep their own backups.
pub fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                "Rename from {} to {} failed ({}), falling back to copy",
                src.display(),
                dst.display(),
                rename_err
            );
            copy_dir(src, dst).with_context(|| {
                format!("Failed to move {} to {}", src.display(), dst.display())
            })?;
            remove_dir_all(src)
                .with_context(|| format!("Failed to remove source after copy: {}", src.display()))
        }
    }
}

/// Normalizes a path by resolving `.` and `..` components.
///
/// Performs logical path resolution without accessing the filesystem. It does
/// not resolve symbolic links or verify that the path exists.
///
/// # Examples
///
/// ```rust,no_run
/// use updraft_agent::utils::fs::normalize_path;
/// use std::path::{Path, PathBuf};
///
/// let path = Path::new("/foo/./bar/../baz");
/// assert_eq!(normalize_path(path), PathBuf::from("/foo/baz"));
/// ```
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            std::path::Component::CurDir => {} // Skip .
            std::path::Component::ParentDir => {
                components.pop(); // Remove previous component for ..
            }
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Checks if a path is safe and doesn't escape the base directory.
///
/// Prevents directory traversal when extracting archive entries: an entry
/// named `../../etc/passwd` must never land outside the extraction root.
///
/// # Examples
///
/// ```rust
/// use updraft_agent::utils::fs::is_safe_path;
/// use std::path::Path;
///
/// let base = Path::new("/work/extract");
///
/// assert!(is_safe_path(base, Path::new("bin/myapp")));
/// assert!(!is_safe_path(base, Path::new("../../../etc/passwd")));
/// assert!(!is_safe_path(base, Path::new("/etc/passwd")));
/// ```
#[must_use]
pub fn is_safe_path(base: &Path, path: &Path) -> bool {
    let normalized_base = normalize_path(base);
    let normalized_path = if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    };

    normalized_path.starts_with(normalized_base)
}

/// Aggregate counts for a directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    /// Number of regular files in the tree.
    pub files: u64,
    /// Total size of those files in bytes.
    pub bytes: u64,
}

/// Walks a directory tree and sums file count and byte total.
///
/// Symlinks are not followed. Returns zeros for a missing directory so status
/// output stays usable on a fresh host.
pub fn dir_stats(path: &Path) -> Result<DirStats> {
    let mut stats = DirStats {
        files: 0,
        bytes: 0,
    };

    if !path.exists() {
        return Ok(stats);
    }

    for entry in WalkDir::new(path).follow_links(false) {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", path.display()))?;
        if entry.file_type().is_file() {
            stats.files += 1;
            stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }

    Ok(stats)
}
