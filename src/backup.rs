//! Durable snapshots of the installation tree and rollback from them.
//!
//! Before the live tree is mutated, the whole installation is copied into
//! a timestamp-named directory under the backups root, next to a small
//! JSON metadata record:
//!
//! ```text
//! <backups-root>/
//! └── 1755856800/
//!     ├── backup.json     {"timestamp": ..., "version": ..., "backup_path": ...}
//!     └── tree/           full copy of the installation
//! ```
//!
//! Snapshots are never mutated after creation and never pruned by the
//! agent. Rollback selects the record with the greatest timestamp; it is
//! the last line of defense after a failed swap, so the restore copy is
//! retried a few times before the run gives up.

use crate::constants::{
    BACKUP_METADATA_FILE, BACKUP_TREE_DIR, RESTORE_ATTEMPTS, RESTORE_RETRY_DELAY,
};
use crate::core::UpdraftError;
use crate::utils::{atomic_write, copy_dir, dir_stats, remove_dir_all};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Metadata record written next to each snapshot.
///
/// The field names and JSON shape are a compatibility contract with
/// external tooling that inspects the backups directory; they must not
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Seconds since the epoch; doubles as the snapshot's identifier and
    /// sort key.
    pub timestamp: u64,
    /// Version string the installation carried when the snapshot was taken.
    pub version: String,
    /// Absolute path of the copied tree at snapshot time.
    pub backup_path: String,
}

/// A record together with where its snapshot actually lives on disk.
///
/// Restoration trusts the discovered location over the recorded
/// `backup_path`, so snapshots keep working after the backups root has
/// been relocated.
#[derive(Debug, Clone)]
struct StoredBackup {
    record: BackupRecord,
    tree_dir: PathBuf,
}

/// Creates, enumerates, and restores installation snapshots.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backups_root: PathBuf,
}

impl BackupManager {
    /// Create a manager rooted at `backups_root`.
    pub fn new(backups_root: impl Into<PathBuf>) -> Self {
        Self {
            backups_root: backups_root.into(),
        }
    }

    /// The directory holding all snapshots.
    #[must_use]
    pub fn backups_root(&self) -> &Path {
        &self.backups_root
    }

    /// Copy the installation at `install_root` into a new snapshot.
    ///
    /// The snapshot directory is named by the current epoch second; when
    /// two snapshots land within the same second, the timestamp advances
    /// until a free slot is found so identifiers stay unique and ordered.
    /// The metadata record is written only after the copy has completed,
    /// so a half-written snapshot is never selectable for rollback.
    ///
    /// # Errors
    ///
    /// Returns [`UpdraftError::BackupError`] when the installation root is
    /// missing or the copy fails. Callers decide whether that aborts the
    /// run or merely costs them a rollback point.
    pub async fn snapshot(
        &self,
        install_root: &Path,
        version: &Version,
    ) -> Result<BackupRecord, UpdraftError> {
        let backup_error = |path: &Path, reason: String| UpdraftError::BackupError {
            path: path.display().to_string(),
            reason,
        };

        if !install_root.exists() {
            return Err(backup_error(
                install_root,
                "installation root does not exist".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.backups_root)
            .await
            .map_err(|e| backup_error(&self.backups_root, format!("cannot create backups root: {e}")))?;

        let mut timestamp = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
        while self.backups_root.join(timestamp.to_string()).exists() {
            timestamp += 1;
        }
        let snapshot_dir = self.backups_root.join(timestamp.to_string());
        let tree_dir = snapshot_dir.join(BACKUP_TREE_DIR);

        let src = install_root.to_path_buf();
        let dst = tree_dir.clone();
        tokio::task::spawn_blocking(move || copy_dir(&src, &dst))
            .await
            .map_err(|e| backup_error(&tree_dir, format!("snapshot task panicked: {e}")))?
            .map_err(|e| backup_error(&tree_dir, format!("copy failed: {e}")))?;

        let record = BackupRecord {
            timestamp,
            version: version.to_string(),
            backup_path: tree_dir.display().to_string(),
        };
        let metadata = serde_json::to_string_pretty(&record)?;
        atomic_write(&snapshot_dir.join(BACKUP_METADATA_FILE), metadata.as_bytes())
            .map_err(|e| backup_error(&snapshot_dir, format!("cannot write metadata: {e}")))?;

        let stats = dir_stats(&tree_dir).unwrap_or_default();
        info!(
            "Backed up version {version} ({} files, {} bytes) to {}",
            stats.files,
            stats.bytes,
            snapshot_dir.display()
        );
        Ok(record)
    }

    /// Enumerate all parseable snapshot records, newest first.
    ///
    /// Directories with missing or malformed metadata are logged and
    /// skipped, never fatal: one bad snapshot must not hide the good ones
    /// from rollback.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backups root exists but cannot be
    /// enumerated. A missing backups root yields an empty list.
    pub async fn list(&self) -> Result<Vec<BackupRecord>, UpdraftError> {
        Ok(self.scan().await?.into_iter().map(|stored| stored.record).collect())
    }

    /// The most recent snapshot record, if any exist.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::list`].
    pub async fn latest(&self) -> Result<Option<BackupRecord>, UpdraftError> {
        Ok(self.scan().await?.into_iter().next().map(|stored| stored.record))
    }

    /// Replace `install_root` with the most recent snapshot's tree.
    ///
    /// Nothing is touched until a usable snapshot has been selected; with
    /// zero usable snapshots this returns [`UpdraftError::NoBackupFound`]
    /// and performs no filesystem mutation. The delete-and-copy is
    /// retried at a fixed interval because just-terminated processes and
    /// antivirus scanners can hold paths for a moment.
    ///
    /// # Errors
    ///
    /// Returns [`UpdraftError::NoBackupFound`] when there is nothing to
    /// restore from, or [`UpdraftError::RollbackError`] when every restore
    /// attempt failed. After a `RollbackError` the live tree must be
    /// repaired by hand.
    pub async fn restore_latest(&self, install_root: &Path) -> Result<BackupRecord, UpdraftError> {
        let stored = self.scan().await?.into_iter().next().ok_or_else(|| {
            UpdraftError::NoBackupFound {
                dir: self.backups_root.display().to_string(),
            }
        })?;

        info!(
            "Restoring version {} from {}",
            stored.record.version,
            stored.tree_dir.display()
        );

        let retry_strategy =
            tokio_retry::strategy::FixedInterval::new(RESTORE_RETRY_DELAY).take(RESTORE_ATTEMPTS - 1);
        let tree_dir = stored.tree_dir.clone();
        let install = install_root.to_path_buf();
        tokio_retry::Retry::spawn(retry_strategy, || {
            let tree_dir = tree_dir.clone();
            let install = install.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    clear_install_path(&install)?;
                    copy_dir(&tree_dir, &install)
                })
                .await
                .map_err(|e| anyhow::anyhow!("restore task panicked: {e}"))?
            }
        })
        .await
        .map_err(|e| UpdraftError::RollbackError {
            reason: format!(
                "could not restore {} from {}: {e}",
                install_root.display(),
                stored.tree_dir.display()
            ),
        })?;

        info!("Restored {} to version {}", install_root.display(), stored.record.version);
        Ok(stored.record)
    }

    /// Scan the backups root for usable snapshots, newest first.
    ///
    /// Usable means the metadata parses and the recorded tree directory is
    /// present on disk.
    async fn scan(&self) -> Result<Vec<StoredBackup>, UpdraftError> {
        let mut entries = match tokio::fs::read_dir(&self.backups_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let snapshot_dir = entry.path();
            if !snapshot_dir.is_dir() {
                continue;
            }
            let metadata_path = snapshot_dir.join(BACKUP_METADATA_FILE);
            let content = match tokio::fs::read_to_string(&metadata_path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping {}: cannot read metadata: {e}", snapshot_dir.display());
                    continue;
                }
            };
            let record: BackupRecord = match serde_json::from_str(&content) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping {}: malformed metadata: {e}", snapshot_dir.display());
                    continue;
                }
            };
            let tree_dir = snapshot_dir.join(BACKUP_TREE_DIR);
            if !tree_dir.is_dir() {
                warn!("Skipping {}: metadata present but tree missing", snapshot_dir.display());
                continue;
            }
            found.push(StoredBackup { record, tree_dir });
        }

        found.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
        Ok(found)
    }
}

/// Remove whatever occupies the install path before the snapshot copy.
///
/// A failed apply can leave a plain file, a partial tree, or nothing at
/// all where the installation used to be; restore has to clear every one
/// of those states.
fn clear_install_path(path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to inspect {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_install_tree(root: &Path, version: &str) {
        std::fs::create_dir_all(root.join("assets")).unwrap();
        std::fs::write(root.join("version.txt"), format!("{version}\n")).unwrap();
        std::fs::write(root.join("app.bin"), version.as_bytes()).unwrap();
        std::fs::write(root.join("assets").join("logo.dat"), b"logo").unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_copies_tree_and_writes_metadata() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        make_install_tree(&install, "2.0.0");
        let manager = BackupManager::new(temp.path().join("backups"));

        let record = manager.snapshot(&install, &Version::new(2, 0, 0)).await.unwrap();

        assert_eq!(record.version, "2.0.0");
        let snapshot_dir = manager.backups_root().join(record.timestamp.to_string());
        let tree = snapshot_dir.join(BACKUP_TREE_DIR);
        assert_eq!(std::fs::read(tree.join("app.bin")).unwrap(), b"2.0.0");
        assert_eq!(std::fs::read(tree.join("assets/logo.dat")).unwrap(), b"logo");

        let raw = std::fs::read_to_string(snapshot_dir.join(BACKUP_METADATA_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["timestamp"], record.timestamp);
        assert_eq!(json["version"], "2.0.0");
        assert_eq!(json["backup_path"], tree.display().to_string());
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_root_fails_without_mutation() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(temp.path().join("backups"));

        let err = manager
            .snapshot(&temp.path().join("missing"), &Version::new(1, 0, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, UpdraftError::BackupError { .. }), "got {err:?}");
        assert!(!manager.backups_root().exists());
    }

    #[tokio::test]
    async fn test_colliding_timestamps_advance() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        make_install_tree(&install, "2.0.0");
        let manager = BackupManager::new(temp.path().join("backups"));

        let first = manager.snapshot(&install, &Version::new(2, 0, 0)).await.unwrap();
        let second = manager.snapshot(&install, &Version::new(2, 0, 0)).await.unwrap();
        let third = manager.snapshot(&install, &Version::new(2, 0, 0)).await.unwrap();

        assert!(second.timestamp > first.timestamp);
        assert!(third.timestamp > second.timestamp);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_skips_malformed() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        make_install_tree(&install, "1.0.0");
        let manager = BackupManager::new(temp.path().join("backups"));

        let first = manager.snapshot(&install, &Version::new(1, 0, 0)).await.unwrap();
        let second = manager.snapshot(&install, &Version::new(1, 1, 0)).await.unwrap();

        // A snapshot directory with unparseable metadata is ignored.
        let broken = manager.backups_root().join("9999999999");
        std::fs::create_dir_all(broken.join(BACKUP_TREE_DIR)).unwrap();
        std::fs::write(broken.join(BACKUP_METADATA_FILE), "{not json").unwrap();

        let records = manager.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], second);
        assert_eq!(records[1], first);
        assert_eq!(manager.latest().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_list_without_backups_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(temp.path().join("never-created"));

        assert!(manager.list().await.unwrap().is_empty());
        assert_eq!(manager.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_with_no_backups_mutates_nothing() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        make_install_tree(&install, "2.0.0");
        let manager = BackupManager::new(temp.path().join("backups"));

        let err = manager.restore_latest(&install).await.unwrap_err();

        assert!(matches!(err, UpdraftError::NoBackupFound { .. }), "got {err:?}");
        // The live tree is untouched.
        assert_eq!(std::fs::read(install.join("app.bin")).unwrap(), b"2.0.0");
    }

    #[tokio::test]
    async fn test_restore_latest_replaces_live_tree() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        make_install_tree(&install, "2.0.0");
        let manager = BackupManager::new(temp.path().join("backups"));

        manager.snapshot(&install, &Version::new(2, 0, 0)).await.unwrap();

        // Wreck the live tree the way a half-applied update would.
        std::fs::remove_file(install.join("app.bin")).unwrap();
        std::fs::write(install.join("version.txt"), "2.1.0\n").unwrap();
        std::fs::write(install.join("stray.tmp"), b"partial").unwrap();

        let restored = manager.restore_latest(&install).await.unwrap();

        assert_eq!(restored.version, "2.0.0");
        assert_eq!(std::fs::read(install.join("app.bin")).unwrap(), b"2.0.0");
        assert_eq!(std::fs::read_to_string(install.join("version.txt")).unwrap(), "2.0.0\n");
        assert!(!install.join("stray.tmp").exists());
    }

    #[tokio::test]
    async fn test_restore_clears_file_obstruction_at_install_path() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        make_install_tree(&install, "2.0.0");
        let manager = BackupManager::new(temp.path().join("backups"));

        manager.snapshot(&install, &Version::new(2, 0, 0)).await.unwrap();

        // A badly failed apply can leave a plain file where the tree was.
        std::fs::remove_dir_all(&install).unwrap();
        std::fs::write(&install, b"wreckage").unwrap();

        let restored = manager.restore_latest(&install).await.unwrap();

        assert_eq!(restored.version, "2.0.0");
        assert!(install.is_dir());
        assert_eq!(std::fs::read(install.join("app.bin")).unwrap(), b"2.0.0");
    }

    #[tokio::test]
    async fn test_restore_picks_greatest_timestamp() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        make_install_tree(&install, "1.0.0");
        let manager = BackupManager::new(temp.path().join("backups"));

        manager.snapshot(&install, &Version::new(1, 0, 0)).await.unwrap();
        std::fs::write(install.join("app.bin"), b"1.1.0").unwrap();
        manager.snapshot(&install, &Version::new(1, 1, 0)).await.unwrap();

        std::fs::write(install.join("app.bin"), b"garbage").unwrap();
        let restored = manager.restore_latest(&install).await.unwrap();

        assert_eq!(restored.version, "1.1.0");
        assert_eq!(std::fs::read(install.join("app.bin")).unwrap(), b"1.1.0");
    }

    #[tokio::test]
    async fn test_restore_survives_stale_recorded_path() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        make_install_tree(&install, "2.0.0");

        // Snapshot under one root, then relocate the whole backups tree.
        let original_root = temp.path().join("backups");
        BackupManager::new(&original_root)
            .snapshot(&install, &Version::new(2, 0, 0))
            .await
            .unwrap();
        let moved_root = temp.path().join("backups-moved");
        std::fs::rename(&original_root, &moved_root).unwrap();

        std::fs::write(install.join("app.bin"), b"garbage").unwrap();
        let restored =
            BackupManager::new(&moved_root).restore_latest(&install).await.unwrap();

        assert_eq!(restored.version, "2.0.0");
        assert_eq!(std::fs::read(install.join("app.bin")).unwrap(), b"2.0.0");
    }
}
