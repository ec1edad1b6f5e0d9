use crate::backup::BackupManager;
use crate::config::AgentConfig;
use crate::workspace::InstanceLock;
use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

/// Command-line arguments for the `rollback` command.
///
/// Restores the installation tree from the most recent backup on operator
/// demand, outside of any update run. No stop step is performed; the
/// operator owns the target application's lifecycle here.
///
/// # Examples
///
/// ```bash
/// updraft rollback --install-root /opt/acme/app
/// ```
#[derive(Parser, Debug)]
pub struct RollbackCommand {
    /// Root directory of the installation to restore.
    #[arg(long, value_name = "PATH")]
    pub install_root: PathBuf,
}

impl RollbackCommand {
    /// Restore the most recent backup over the live tree.
    ///
    /// Holds the single-instance lock for the duration so a concurrent
    /// update run cannot interleave with the restore.
    pub async fn execute(self, config: AgentConfig) -> Result<()> {
        let backups_root = config.backups_root_for(&self.install_root);
        let _lock = InstanceLock::acquire(&backups_root).await?;

        println!(
            "{}",
            format!(
                "Rolling back {} to the most recent backup...",
                self.install_root.display()
            )
            .yellow()
        );

        let manager = BackupManager::new(&backups_root);
        let restored = manager
            .restore_latest(&self.install_root)
            .await
            .context("rollback failed; the live tree may need manual recovery")?;

        println!(
            "{}",
            format!(
                "Restored version {} (backup taken {})",
                restored.version,
                render_timestamp(restored.timestamp)
            )
            .green()
        );

        Ok(())
    }
}

/// Epoch seconds rendered as a UTC wall-clock time, falling back to the
/// raw number for out-of-range values.
pub(crate) fn render_timestamp(secs: u64) -> String {
    DateTime::from_timestamp(secs as i64, 0).map_or_else(
        || secs.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_timestamp_formats_epoch_seconds() {
        assert_eq!(render_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(render_timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn test_render_timestamp_out_of_range_falls_back_to_raw() {
        assert_eq!(render_timestamp(u64::MAX), u64::MAX.to_string());
    }
}
