use crate::config::AgentConfig;
use crate::orchestrator::UpdateOrchestrator;
use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

/// Command-line arguments for the `update` command.
///
/// Runs the full update transaction against one installation: fetch the
/// package for the requested version, verify it, snapshot the current
/// tree, stop the running application, and swap the new tree into place.
/// A failed swap rolls back to the most recent backup automatically.
///
/// # Examples
///
/// ```bash
/// # Plain update using the configured endpoint
/// updraft update 2.1.0 --install-root /opt/acme/app
///
/// # One-off endpoint override
/// updraft update 2.1.0 --install-root /opt/acme/app \
///     --package-url "https://releases.example.com/packages/{version}.zip"
///
/// # Strict mode for unattended rollouts: a missed backup or a survivor
/// # process aborts before the tree is touched
/// updraft update 2.1.0 --install-root /opt/acme/app \
///     --require-backup --require-stop
/// ```
#[derive(Parser, Debug)]
pub struct UpdateCommand {
    /// Version to install (e.g. "2.1.0").
    ///
    /// Must parse as a semantic version; it is substituted into the
    /// endpoint's `{version}` URL template to locate the package.
    #[arg(value_name = "VERSION")]
    pub version: String,

    /// Root directory of the installation to update.
    #[arg(long, value_name = "PATH")]
    pub install_root: PathBuf,

    /// Package URL template overriding `endpoint.package_url_template`
    /// from the config file for this run.
    #[arg(long, value_name = "TEMPLATE")]
    pub package_url: Option<String>,

    /// Skip the backup step.
    ///
    /// The run proceeds without a fresh snapshot; if the swap then fails,
    /// rollback falls back to the most recent earlier backup, which may
    /// be stale or absent.
    #[arg(long, conflicts_with = "require_backup")]
    pub no_backup: bool,

    /// Treat a failed backup as fatal instead of continuing without one.
    #[arg(long)]
    pub require_backup: bool,

    /// Skip the stop step and replace files under a possibly running
    /// application.
    #[arg(long, conflicts_with = "require_stop")]
    pub no_stop: bool,

    /// Treat processes that survive the stop window as fatal.
    #[arg(long)]
    pub require_stop: bool,
}

impl UpdateCommand {
    /// Execute the update transaction and print its summary.
    ///
    /// Command-line switches override the loaded configuration for this
    /// run only; the config file is never rewritten.
    pub async fn execute(self, mut config: AgentConfig) -> Result<()> {
        if let Some(template) = self.package_url {
            config.endpoint.package_url_template = Some(template);
        }
        if self.require_backup {
            config.policies.require_backup = true;
        }
        if self.require_stop {
            config.policies.require_stop = true;
        }

        println!(
            "{}",
            format!(
                "Updating {} to version {}...",
                self.install_root.display(),
                self.version
            )
            .cyan()
        );

        let orchestrator = UpdateOrchestrator::new(config, &self.install_root)
            .skip_backup(self.no_backup)
            .skip_stop(self.no_stop);
        let report = orchestrator.run(&self.version).await?;

        println!("{}", "Update completed successfully".green().bold());
        println!(
            "  Version: {} -> {}",
            report.previous_version.to_string().yellow(),
            report.target_version.to_string().yellow()
        );
        match &report.backup {
            Some(backup) => println!("  Backup:  {}", backup.backup_path.bright_black()),
            None => println!("  Backup:  {}", "none taken".bright_black()),
        }
        if report.stop.matched > 0 {
            println!(
                "  Stopped: {} of {} matched process(es)",
                report.stop.stopped, report.stop.matched
            );
        }
        println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());

        Ok(())
    }
}
