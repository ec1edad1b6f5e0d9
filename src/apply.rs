//! Extraction of the verified package and the atomic swap.
//!
//! The swap is the only part of the run that mutates the installation,
//! and it is built so that a crash at any point never leaves a mixture
//! of old and new files under the live path:
//!
//! 1. copy the extracted tree into a staging area inside the workspace,
//! 2. move the live tree into a quarantine area inside the workspace,
//! 3. move the staging copy into the live path,
//! 4. delete the quarantine copy.
//!
//! Moves are preferred over delete-then-copy: where the filesystem
//! permits a rename the live path is absent only for an instant, and the
//! outgoing tree stays whole in quarantine until the new tree is in
//! place. Steps 1 through 3 abort the swap on failure; a failed deletion
//! in step 4 is only logged, since the quarantine copy sits inside the
//! workspace and is removed with it moments later.

use crate::core::UpdraftError;
use crate::utils::{copy_dir, ensure_parent_dir, move_dir, remove_dir_all};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Performs extraction and the staged swap of old for new.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateApplier;

impl UpdateApplier {
    /// Create an applier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Unpack the archive at `archive_path` into `extract_dir`.
    ///
    /// The archive's root is the new installation's root: an archive
    /// carrying `version.txt` and `app.bin` at top level produces them at
    /// the top of `extract_dir`. Entry paths are confined to the
    /// extraction root; an entry that would escape it fails the whole
    /// extraction rather than being silently skipped. Unix permission
    /// bits recorded in the archive are applied to the extracted files.
    ///
    /// Runs on a blocking thread; the archive was already validated, so
    /// failures here are unexpected I/O problems, not corrupt data.
    ///
    /// # Errors
    ///
    /// Returns [`UpdraftError::ApplyError`] with step `"extract"`.
    pub async fn extract(
        &self,
        archive_path: &Path,
        extract_dir: &Path,
    ) -> Result<PathBuf, UpdraftError> {
        let archive = archive_path.to_path_buf();
        let dest = extract_dir.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
            .await
            .map_err(|e| UpdraftError::Other {
                message: format!("extraction task panicked: {e}"),
            })??;

        info!("Extracted {entries} entries to {}", extract_dir.display());
        Ok(extract_dir.to_path_buf())
    }

    /// Replace the live tree at `install_root` with the tree at `extracted`.
    ///
    /// `staging` and `quarantine` must be empty directories inside the run
    /// workspace. On success the quarantined old tree has been deleted; on
    /// failure the old tree is either still live (step 1 failed) or whole
    /// inside `quarantine` (steps 2 or 3 failed), and the caller decides
    /// how to recover.
    ///
    /// # Errors
    ///
    /// Returns [`UpdraftError::ApplyError`] naming the step that failed.
    pub async fn swap(
        &self,
        extracted: &Path,
        install_root: &Path,
        staging: &Path,
        quarantine: &Path,
    ) -> Result<(), UpdraftError> {
        info!("Swapping {} into {}", extracted.display(), install_root.display());

        let extracted = extracted.to_path_buf();
        let install_root = install_root.to_path_buf();
        let staging = staging.to_path_buf();
        let quarantine = quarantine.to_path_buf();
        tokio::task::spawn_blocking(move || {
            stage_new_tree(&extracted, &staging)?;
            quarantine_live_tree(&install_root, &quarantine)?;
            promote_staging(&staging, &install_root)?;
            if let Err(e) = discard_quarantine(&quarantine) {
                warn!("Could not delete quarantined tree, workspace cleanup will retry: {e}");
            }
            Ok(())
        })
        .await
        .map_err(|e| UpdraftError::Other {
            message: format!("swap task panicked: {e}"),
        })?
    }
}

fn apply_error(step: &str, reason: String) -> UpdraftError {
    UpdraftError::ApplyError {
        step: step.to_string(),
        reason,
    }
}

/// Unpack every archive entry under `dest`. Returns the entry count.
fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize, UpdraftError> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| apply_error("extract", format!("cannot open archive: {e}")))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| apply_error("extract", format!("cannot read archive: {e}")))?;

    std::fs::create_dir_all(dest)
        .map_err(|e| apply_error("extract", format!("cannot create {}: {e}", dest.display())))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| apply_error("extract", format!("cannot read entry {i}: {e}")))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(apply_error(
                "extract",
                format!("entry {:?} escapes the extraction root", entry.name()),
            ));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| {
                apply_error("extract", format!("cannot create {}: {e}", out_path.display()))
            })?;
        } else {
            ensure_parent_dir(&out_path)
                .map_err(|e| apply_error("extract", e.to_string()))?;
            let mut out_file = std::fs::File::create(&out_path).map_err(|e| {
                apply_error("extract", format!("cannot create {}: {e}", out_path.display()))
            })?;
            std::io::copy(&mut entry, &mut out_file).map_err(|e| {
                apply_error("extract", format!("cannot write {}: {e}", out_path.display()))
            })?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| {
                        apply_error(
                            "extract",
                            format!("cannot set permissions on {}: {e}", out_path.display()),
                        )
                    })?;
            }
        }
    }

    Ok(archive.len())
}

/// Step 1: copy the extracted tree into the staging area.
///
/// The extraction location is never used as the swap source directly; a
/// problem while copying must surface before the live tree is touched.
pub(crate) fn stage_new_tree(extracted: &Path, staging: &Path) -> Result<(), UpdraftError> {
    debug!("Staging {} at {}", extracted.display(), staging.display());
    copy_dir(extracted, staging).map_err(|e| apply_error("stage", e.to_string()))
}

/// Step 2: move the live tree into quarantine. No live tree is fine.
pub(crate) fn quarantine_live_tree(
    install_root: &Path,
    quarantine: &Path,
) -> Result<(), UpdraftError> {
    if !install_root.exists() {
        debug!("No live tree at {}; nothing to quarantine", install_root.display());
        return Ok(());
    }
    debug!("Quarantining {} at {}", install_root.display(), quarantine.display());
    move_dir(install_root, quarantine).map_err(|e| apply_error("quarantine", e.to_string()))
}

/// Step 3: move the staged tree into the live path.
pub(crate) fn promote_staging(staging: &Path, install_root: &Path) -> Result<(), UpdraftError> {
    debug!("Promoting {} to {}", staging.display(), install_root.display());
    if !staging.exists() {
        return Err(apply_error(
            "promote",
            format!("staging tree {} is missing", staging.display()),
        ));
    }
    ensure_parent_dir(install_root).map_err(|e| apply_error("promote", e.to_string()))?;
    move_dir(staging, install_root).map_err(|e| apply_error("promote", e.to_string()))
}

/// Step 4: delete the quarantined old tree.
pub(crate) fn discard_quarantine(quarantine: &Path) -> Result<(), UpdraftError> {
    debug!("Discarding quarantine at {}", quarantine.display());
    remove_dir_all(quarantine).map_err(|e| apply_error("discard", e.to_string()))
}
