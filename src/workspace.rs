//! Per-run scratch workspace and single-instance locking.
//!
//! Every update run owns a uniquely named scratch directory holding the
//! downloaded archive, its extracted contents, and the swap staging areas.
//! The workspace is deleted on every exit path: the orchestrator calls
//! [`RunWorkspace::close`] to surface deletion errors, and [`Drop`] covers
//! early returns and panics.
//!
//! Two runs mutating the same installation concurrently would corrupt it,
//! so before touching anything a run acquires an [`InstanceLock`] under the
//! backups root. A second invocation fails fast instead of queueing.

use crate::constants::INSTANCE_LOCK_FILE;
use crate::core::UpdraftError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

/// Ephemeral scratch directory owned by a single update run.
///
/// Layout:
///
/// ```text
/// updraft-<run-id>-XXXXXX/
/// ├── download/     downloaded package archive
/// ├── extract/      archive contents after extraction
/// ├── staging/      copy that becomes the new live tree
/// └── quarantine/   outgoing live tree during the swap
/// ```
///
/// All four subdirectories exist from creation, so callers can treat the
/// paths as valid destinations without checking.
#[derive(Debug)]
pub struct RunWorkspace {
    root: TempDir,
    run_id: String,
}

impl RunWorkspace {
    /// Create a fresh workspace under `scratch_root`.
    ///
    /// `None` places it in the system temporary directory. The directory
    /// name embeds a random run identifier so concurrent runs against
    /// different installations never collide and log lines can be matched
    /// to on-disk remnants if cleanup is interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch root or any subdirectory cannot be
    /// created.
    pub fn create(scratch_root: Option<&Path>) -> Result<Self> {
        let base = scratch_root.map_or_else(std::env::temp_dir, Path::to_path_buf);
        std::fs::create_dir_all(&base)
            .with_context(|| format!("Failed to create scratch root {}", base.display()))?;

        let run_id = Uuid::new_v4().simple().to_string();
        let root = tempfile::Builder::new()
            .prefix(&format!("updraft-{}-", &run_id[..8]))
            .tempdir_in(&base)
            .with_context(|| format!("Failed to create run workspace in {}", base.display()))?;

        for sub in ["download", "extract", "staging", "quarantine"] {
            let dir = root.path().join(sub);
            std::fs::create_dir(&dir)
                .with_context(|| format!("Failed to create workspace dir {}", dir.display()))?;
        }

        debug!("Created run workspace {}", root.path().display());
        Ok(Self { root, run_id })
    }

    /// Identifier tying this run's log lines to its scratch directory.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Root of the workspace.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Directory receiving the downloaded package archive.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.root.path().join("download")
    }

    /// Directory receiving the extracted archive contents.
    #[must_use]
    pub fn extract_dir(&self) -> PathBuf {
        self.root.path().join("extract")
    }

    /// Staging area the swap promotes into the installation root.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.path().join("staging")
    }

    /// Holding area for the outgoing live tree during the swap.
    #[must_use]
    pub fn quarantine_dir(&self) -> PathBuf {
        self.root.path().join("quarantine")
    }

    /// Delete the workspace, surfacing deletion errors.
    ///
    /// Dropping the workspace also deletes it, but silently; the
    /// orchestrator calls `close` so a cleanup failure lands in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory tree cannot be removed.
    pub fn close(self) -> Result<()> {
        let path = self.root.path().to_path_buf();
        self.root
            .close()
            .with_context(|| format!("Failed to delete run workspace {}", path.display()))?;
        debug!("Deleted run workspace {}", path.display());
        Ok(())
    }
}

/// Exclusive lock preventing concurrent runs against one installation.
///
/// Backed by an OS-level file lock on `<backups-root>/.updraft.lock`, so
/// exclusion works across processes. The lock is released and the lock
/// file removed when the guard is dropped.
#[derive(Debug)]
pub struct InstanceLock {
    /// The file handle; the OS lock is released when this is dropped.
    _file: Arc<File>,
    lock_path: PathBuf,
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        debug!("Instance lock released: {}", self.lock_path.display());
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove lock file {}: {e}", self.lock_path.display());
            }
        }
    }
}

impl InstanceLock {
    /// Try to acquire the lock for the installation served by `backups_root`.
    ///
    /// Creates the backups root if needed, then makes a single non-blocking
    /// lock attempt. An update is not something to queue behind another
    /// update, so contention is an immediate
    /// [`UpdraftError::UpdateInProgress`] rather than a wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or another
    /// process already holds the lock.
    pub async fn acquire(backups_root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(backups_root).await.with_context(|| {
            format!("Failed to create backups root {}", backups_root.display())
        })?;

        let lock_path = backups_root.join(INSTANCE_LOCK_FILE);

        // File open and lock both go through spawn_blocking so a slow or
        // network filesystem cannot stall the runtime.
        let lock_path_clone = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&lock_path_clone)
        })
        .await
        .context("spawn_blocking panicked")?
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        let file = Arc::new(file);
        let file_clone = Arc::clone(&file);
        let lock_result = tokio::task::spawn_blocking(move || file_clone.try_lock_exclusive())
            .await
            .context("spawn_blocking panicked")?;

        match lock_result {
            Ok(true) => {
                debug!("Instance lock acquired: {}", lock_path.display());
                Ok(Self {
                    _file: file,
                    lock_path,
                })
            }
            Ok(false) | Err(_) => Err(UpdraftError::UpdateInProgress {
                path: lock_path.display().to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_creates_subdirs() {
        let scratch = TempDir::new().unwrap();
        let workspace = RunWorkspace::create(Some(scratch.path())).unwrap();

        assert!(workspace.download_dir().is_dir());
        assert!(workspace.extract_dir().is_dir());
        assert!(workspace.staging_dir().is_dir());
        assert!(workspace.quarantine_dir().is_dir());
        assert!(workspace.root().starts_with(scratch.path()));
        assert_eq!(workspace.run_id().len(), 32);
    }

    #[test]
    fn test_workspace_close_deletes_tree() {
        let scratch = TempDir::new().unwrap();
        let workspace = RunWorkspace::create(Some(scratch.path())).unwrap();
        let root = workspace.root().to_path_buf();

        std::fs::write(root.join("download").join("pkg.zip"), b"data").unwrap();
        workspace.close().unwrap();

        assert!(!root.exists());
    }

    #[test]
    fn test_workspace_drop_deletes_tree() {
        let scratch = TempDir::new().unwrap();
        let root = {
            let workspace = RunWorkspace::create(Some(scratch.path())).unwrap();
            workspace.root().to_path_buf()
        };

        assert!(!root.exists());
    }

    #[test]
    fn test_workspaces_do_not_collide() {
        let scratch = TempDir::new().unwrap();
        let a = RunWorkspace::create(Some(scratch.path())).unwrap();
        let b = RunWorkspace::create(Some(scratch.path())).unwrap();

        assert_ne!(a.root(), b.root());
        assert_ne!(a.run_id(), b.run_id());
    }

    #[tokio::test]
    async fn test_instance_lock_creates_backups_root() {
        let temp = TempDir::new().unwrap();
        let backups_root = temp.path().join("app.backups");

        let lock = InstanceLock::acquire(&backups_root).await.unwrap();
        assert!(backups_root.join(INSTANCE_LOCK_FILE).exists());
        drop(lock);
    }

    #[tokio::test]
    async fn test_instance_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();

        let _held = InstanceLock::acquire(temp.path()).await.unwrap();
        let second = InstanceLock::acquire(temp.path()).await;

        let err = second.unwrap_err();
        let typed = err.downcast_ref::<UpdraftError>().unwrap();
        assert!(matches!(typed, UpdraftError::UpdateInProgress { .. }));
    }

    #[tokio::test]
    async fn test_instance_lock_released_on_drop() {
        let temp = TempDir::new().unwrap();

        let lock = InstanceLock::acquire(temp.path()).await.unwrap();
        drop(lock);

        assert!(!temp.path().join(INSTANCE_LOCK_FILE).exists());
        let reacquired = InstanceLock::acquire(temp.path()).await;
        assert!(reacquired.is_ok());
    }
}
