//! The end-to-end update transaction.
//!
//! One run is one linear pass: FETCH → VERIFY → BACKUP → STOP_TARGET →
//! APPLY, with a single recovery branch. Fetch, verify, and extract
//! failures abort before anything destructive has happened. Backup and
//! stop failures are tolerated by default and fatal under the
//! `require_backup` / `require_stop` policy switches. A swap failure
//! triggers rollback from the most recent durable backup, and the run
//! reports failure even when that rollback succeeds; the caller must
//! never mistake a recovered installation for a completed update.
//!
//! The run workspace is deleted on every exit path. The orchestrator
//! closes it explicitly so deletion problems are logged; RAII teardown
//! covers panics and early exits.

use crate::apply::UpdateApplier;
use crate::backup::{BackupManager, BackupRecord};
use crate::config::AgentConfig;
use crate::core::UpdraftError;
use crate::fetch::PackageFetcher;
use crate::process::{ProcessController, StopReport};
use crate::verify::IntegrityVerifier;
use crate::version::VersionStore;
use crate::workspace::{InstanceLock, RunWorkspace};
use anyhow::{Context, Result};
use semver::Version;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Summary of a completed update run.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    /// Identifier correlating log lines, workspace, and this report.
    pub run_id: String,
    /// Version installed before the run.
    pub previous_version: Version,
    /// Version installed by the run.
    pub target_version: Version,
    /// Snapshot taken before the swap, when one could be taken.
    pub backup: Option<BackupRecord>,
    /// What the stop pass found and achieved.
    pub stop: StopReport,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Sequences the update transaction against one installation.
pub struct UpdateOrchestrator {
    config: AgentConfig,
    install_root: PathBuf,
    backups_root: PathBuf,
    skip_backup: bool,
    skip_stop: bool,
}

impl UpdateOrchestrator {
    /// Create an orchestrator for `install_root` under the given config.
    pub fn new(config: AgentConfig, install_root: impl Into<PathBuf>) -> Self {
        let install_root = install_root.into();
        let backups_root = config.backups_root_for(&install_root);
        Self {
            config,
            install_root,
            backups_root,
            skip_backup: false,
            skip_stop: false,
        }
    }

    /// Skip the backup step entirely. A later swap failure then rolls
    /// back to whatever the most recent earlier backup holds.
    #[must_use]
    pub const fn skip_backup(mut self, skip: bool) -> Self {
        self.skip_backup = skip;
        self
    }

    /// Skip the stop step entirely, leaving the target's lifecycle to
    /// the operator.
    #[must_use]
    pub const fn skip_stop(mut self, skip: bool) -> Self {
        self.skip_stop = skip;
        self
    }

    /// Run the update transaction for `target_version`.
    ///
    /// Holds the single-instance lock for the whole run. On success the
    /// live tree is the new version and the returned report says what
    /// happened; on failure the live tree is the old version (untouched,
    /// or restored by rollback) except after a [`UpdraftError::RollbackError`],
    /// which means manual recovery from the backups directory is needed.
    ///
    /// # Errors
    ///
    /// Any step's failure, classified per the error taxonomy in
    /// [`crate::core`].
    pub async fn run(&self, target_version: &str) -> Result<UpdateReport> {
        let started = Instant::now();
        let target = Version::parse(target_version.trim()).map_err(|_| {
            UpdraftError::InvalidVersion {
                version: target_version.to_string(),
            }
        })?;

        let _lock = InstanceLock::acquire(&self.backups_root).await?;

        let previous = VersionStore::new(&self.install_root).read();
        let workspace = RunWorkspace::create(self.config.scratch_root().as_deref())
            .context("could not create the run workspace")?;
        let run_id = workspace.run_id().to_string();
        info!(
            "Update run {run_id}: {previous} -> {target} at {}",
            self.install_root.display()
        );

        let outcome = self.execute(&workspace, &target, &previous).await;

        // Unconditional cleanup. Failures are logged, never escalated:
        // the run's own outcome matters more than a leftover tempdir.
        if let Err(e) = workspace.close() {
            warn!("{e}");
        }

        let (backup, stop) = outcome?;
        let elapsed = started.elapsed();
        info!(
            "Update run {run_id} succeeded: {previous} -> {target} in {:.1}s",
            elapsed.as_secs_f64()
        );
        Ok(UpdateReport {
            run_id,
            previous_version: previous,
            target_version: target,
            backup,
            stop,
            elapsed,
        })
    }

    /// The fallible middle of the transaction, between workspace creation
    /// and workspace cleanup.
    async fn execute(
        &self,
        workspace: &RunWorkspace,
        target: &Version,
        previous: &Version,
    ) -> Result<(Option<BackupRecord>, StopReport)> {
        // FETCH. The cheapest point to fail; nothing exists yet but the
        // workspace.
        let fetcher =
            PackageFetcher::new(self.config.package_url_template()?, self.config.fetch_timeout())?;
        let package = fetcher
            .fetch(target, &workspace.download_dir())
            .await
            .context("download failed; the installation was not touched")?;

        // VERIFY. Still nothing destructive.
        IntegrityVerifier::new()
            .verify(&package.archive_path)
            .await
            .context("package verification failed; the installation was not touched")?;

        // Extraction stays inside the workspace, so a failure here still
        // aborts cleanly with no rollback needed.
        let applier = UpdateApplier::new();
        let extracted = applier
            .extract(&package.archive_path, &workspace.extract_dir())
            .await
            .context("package extraction failed; the installation was not touched")?;

        // BACKUP, best-effort unless policy says otherwise.
        let backup_manager = BackupManager::new(&self.backups_root);
        let backup = if self.skip_backup {
            info!("Backup step skipped on operator request");
            None
        } else {
            match backup_manager.snapshot(&self.install_root, previous).await {
                Ok(record) => Some(record),
                Err(e) if self.config.policies.require_backup => {
                    return Err(e).context("snapshot failed and require_backup is set");
                }
                Err(e) => {
                    warn!("Continuing without a fresh backup: {e}");
                    None
                }
            }
        };

        // STOP_TARGET, best-effort unless policy says otherwise.
        let stop = if self.skip_stop {
            info!("Stop step skipped on operator request");
            StopReport::default()
        } else {
            let controller = ProcessController::new(
                self.config.process.signature.clone(),
                self.config.pid_file_path(),
                self.config.stop_timeout(),
                self.config.settle_delay(),
            );
            controller.stop_target().await
        };
        if !stop.fully_stopped() {
            let e = UpdraftError::ProcessStopError {
                target: self
                    .config
                    .process
                    .signature
                    .clone()
                    .unwrap_or_else(|| "configured pid file".to_string()),
                reason: format!("{} process(es) survived the stop window", stop.survivors.len()),
            };
            if self.config.policies.require_stop {
                return Err(e).context("stop failed and require_stop is set");
            }
            warn!("{e}; file replacement may race a still-running process");
        }

        // APPLY. The one destructive phase; a failure here is what the
        // backups exist for.
        if let Err(apply_err) = applier
            .swap(
                &extracted,
                &self.install_root,
                &workspace.staging_dir(),
                &workspace.quarantine_dir(),
            )
            .await
        {
            error!("{apply_err}; attempting rollback");
            match backup_manager.restore_latest(&self.install_root).await {
                Ok(restored) => {
                    warn!(
                        "Rolled back {} to version {}",
                        self.install_root.display(),
                        restored.version
                    );
                    return Err(apply_err)
                        .context("update failed; the previous version was restored from backup");
                }
                Err(rollback_err) => {
                    error!("{rollback_err}");
                    return Err(anyhow::Error::new(rollback_err)).with_context(|| {
                        format!("update failed ({apply_err}) and rollback also failed")
                    });
                }
            }
        }

        Ok((backup, stop))
    }
}
