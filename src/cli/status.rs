use crate::backup::BackupManager;
use crate::cli::rollback::render_timestamp;
use crate::config::AgentConfig;
use crate::utils::fs::dir_stats;
use crate::version::VersionStore;
use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

/// Command-line arguments for the `status` command.
///
/// Read-only inspection of one installation: the installed version, the
/// size of the live tree, and the available backups newest first.
///
/// # Examples
///
/// ```bash
/// updraft status --install-root /opt/acme/app
/// ```
#[derive(Parser, Debug)]
pub struct StatusCommand {
    /// Root directory of the installation to inspect.
    #[arg(long, value_name = "PATH")]
    pub install_root: PathBuf,
}

impl StatusCommand {
    /// Print the installation's version, tree size, and backup listing.
    pub async fn execute(self, config: AgentConfig) -> Result<()> {
        let version = VersionStore::new(&self.install_root).read();
        println!("{} {}", "Installation:".bold(), self.install_root.display());
        println!("  Version: {}", version.to_string().yellow());

        if self.install_root.is_dir() {
            let stats = dir_stats(&self.install_root)?;
            println!(
                "  Tree:    {} file(s), {}",
                stats.files,
                format_bytes(stats.bytes)
            );
        } else {
            println!("  Tree:    {}", "not present".red());
        }

        let backups_root = config.backups_root_for(&self.install_root);
        let backups = BackupManager::new(&backups_root).list().await?;
        println!();
        if backups.is_empty() {
            println!("{}", "No backups.".bright_black());
        } else {
            println!("{} ({})", "Backups:".bold(), backups_root.display());
            for record in &backups {
                println!(
                    "  {}  {}  {}",
                    render_timestamp(record.timestamp).cyan(),
                    format!("v{}", record.version).yellow(),
                    record.backup_path.bright_black()
                );
            }
        }

        Ok(())
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_picks_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
