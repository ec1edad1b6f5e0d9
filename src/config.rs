//! Agent configuration loaded from the user's `config.toml`.
//!
//! The update agent keeps all tunable behavior in a single TOML file so that
//! operators can adjust endpoints, safety policies, and paths without
//! rebuilding. Every field has a sensible default, so a missing configuration
//! file is not an error.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.updraft/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\updraft\config.toml`
//!
//! The location can be overridden with the `--config` flag or the
//! `UPDRAFT_CONFIG` environment variable (both handled by the CLI layer).
//!
//! # File Format
//!
//! ```toml
//! [endpoint]
//! # "{version}" is replaced with the requested target version
//! package_url_template = "https://releases.example.com/app/update-{version}.zip"
//! timeout_secs = 300
//!
//! [policies]
//! # Abort the run if the pre-update snapshot cannot be created
//! require_backup = false
//! # Abort the run if the target process cannot be confirmed stopped
//! require_stop = false
//!
//! [process]
//! # Command-line substring used to locate the running target application
//! signature = "my-app --serve"
//! # Preferred over signature matching when the target writes a PID file
//! pid_file = "/var/run/my-app.pid"
//! stop_timeout_secs = 10
//! settle_delay_secs = 3
//!
//! [paths]
//! backups_dir = "~/.updraft/backups"
//! scratch_dir = "/var/tmp"
//! log_file = "~/.updraft/updraft.log"
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use updraft_agent::config::AgentConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AgentConfig::load().await?;
//! println!("fetch timeout: {:?}", config.fetch_timeout());
//! # Ok(())
//! # }
//! ```

use crate::constants::{FETCH_TIMEOUT, PROCESS_SETTLE_DELAY, PROCESS_STOP_TIMEOUT};
use crate::core::UpdraftError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Top-level agent configuration.
///
/// Deserialized from `config.toml`. All sections are optional; omitted
/// sections and fields take the defaults documented on each field, which
/// match the built-in constants in [`crate::constants`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AgentConfig {
    /// Download endpoint settings.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Safety/availability trade-off switches.
    #[serde(default)]
    pub policies: PolicyConfig,

    /// Target process discovery and shutdown settings.
    #[serde(default)]
    pub process: ProcessConfig,

    /// Filesystem locations used by the agent.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Settings for the `[endpoint]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// URL template for update packages.
    ///
    /// The literal `{version}` is replaced with the requested target version
    /// at fetch time. There is no usable default; an update run fails with a
    /// configuration error when this is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_url_template: Option<String>,

    /// Overall download deadline in seconds.
    ///
    /// Default: `300` (5 minutes). Packages can be tens of megabytes, so the
    /// ceiling is generous; it exists to bound a stalled transfer, not to
    /// police slow ones.
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

/// Settings for the `[policies]` section.
///
/// Backup and process-stop are best-effort steps: their failure is logged and
/// the run continues. These switches turn either failure into a run abort for
/// operators who prefer maximal safety over availability.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PolicyConfig {
    /// Abort the run if the pre-update snapshot cannot be created.
    ///
    /// Default: `false`. When disabled, a failed snapshot is logged and the
    /// update proceeds with no rollback point.
    #[serde(default)]
    pub require_backup: bool,

    /// Abort the run if the target process cannot be confirmed stopped.
    ///
    /// Default: `false`. When disabled, file replacement may race a still
    /// running process; that degraded mode is logged, never silent.
    #[serde(default)]
    pub require_stop: bool,
}

/// Settings for the `[process]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessConfig {
    /// Command-line substring identifying the target application.
    ///
    /// Used to locate the running instance via process enumeration when no
    /// PID file is available. Unset means there is nothing to stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// PID file written by the target application at startup.
    ///
    /// Checked before any command-line scanning; a readable PID file removes
    /// the ambiguity of signature matching. Supports `~` expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<String>,

    /// How long to wait for each matched process to exit, in seconds.
    ///
    /// Default: `10`.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Pause after all matches are handled, in seconds.
    ///
    /// Default: `3`. Gives the OS time to release file handles held by the
    /// terminated process before the installation tree is mutated.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
}

/// Settings for the `[paths]` section.
///
/// All values support `~` expansion. Every field is optional; the accessors
/// on [`AgentConfig`] document the derived defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PathsConfig {
    /// Root directory holding timestamped backup snapshots.
    ///
    /// Default: `<parent-of-install-root>/<install-root-name>.backups`,
    /// keeping snapshots on the same volume as the tree they copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backups_dir: Option<String>,

    /// Directory under which per-run scratch workspaces are created.
    ///
    /// Default: the system temporary directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,

    /// Log file receiving a copy of all diagnostic output.
    ///
    /// Default: `~/.updraft/updraft.log`. Output always goes to stdout as
    /// well; if the file cannot be opened, logging degrades to stdout only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            package_url_template: None,
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            signature: None,
            pid_file: None,
            stop_timeout_secs: default_stop_timeout_secs(),
            settle_delay_secs: default_settle_delay_secs(),
        }
    }
}

/// Default download deadline in seconds.
fn default_fetch_timeout_secs() -> u64 {
    FETCH_TIMEOUT.as_secs()
}

/// Default per-process stop wait in seconds.
fn default_stop_timeout_secs() -> u64 {
    PROCESS_STOP_TIMEOUT.as_secs()
}

/// Default post-stop settle delay in seconds.
fn default_settle_delay_secs() -> u64 {
    PROCESS_SETTLE_DELAY.as_secs()
}

impl AgentConfig {
    /// Load configuration from the default platform-specific location.
    ///
    /// Returns the default configuration if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The default path cannot be determined
    /// - The file exists but cannot be read
    /// - The file contains invalid TOML
    pub async fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional explicit path.
    ///
    /// If `path` is `None`, falls back to [`Self::default_path`]. A missing
    /// file at either location yields the default configuration; the CLI
    /// passes its `--config` value straight through here.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(|| {
            Self::default_path().unwrap_or_else(|_| PathBuf::from("~/.updraft/config.toml"))
        });
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse as the
    /// expected TOML schema.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save configuration to a specific file path as pretty TOML.
    ///
    /// Creates parent directories as needed. Primarily used by tests and
    /// provisioning tooling; the agent itself never rewrites its config.
    ///
    /// # Errors
    ///
    /// Returns an error if parent directories cannot be created or the file
    /// cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Get the default platform-specific configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory (Unix) or local data directory
    /// (Windows) cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::state_dir()?.join("config.toml"))
    }

    /// Get the agent's state directory (`~/.updraft` or platform equivalent).
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be determined.
    pub fn state_dir() -> Result<PathBuf> {
        let dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("updraft")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".updraft")
        };

        Ok(dir)
    }

    /// The package URL template, or a configuration error when unset.
    ///
    /// # Errors
    ///
    /// Returns [`UpdraftError::ConfigError`] if `endpoint.package_url_template`
    /// is missing or empty.
    pub fn package_url_template(&self) -> Result<&str, UpdraftError> {
        match self.endpoint.package_url_template.as_deref() {
            Some(template) if !template.trim().is_empty() => Ok(template),
            _ => Err(UpdraftError::ConfigError {
                message: "endpoint.package_url_template is not set".to_string(),
            }),
        }
    }

    /// Overall download deadline.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint.timeout_secs)
    }

    /// Per-process stop wait.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.process.stop_timeout_secs)
    }

    /// Post-stop settle delay.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.process.settle_delay_secs)
    }

    /// Resolve the backups root for a given installation root.
    ///
    /// Uses `paths.backups_dir` when set (with `~` expanded); otherwise
    /// derives a sibling directory next to the installation so snapshots stay
    /// on the same volume: `/opt/my-app` backs up to `/opt/my-app.backups`.
    #[must_use]
    pub fn backups_root_for(&self, install_root: &Path) -> PathBuf {
        if let Some(dir) = &self.paths.backups_dir {
            return expand_path(dir);
        }

        let name = install_root
            .file_name()
            .map_or_else(|| "install".to_string(), |n| n.to_string_lossy().into_owned());
        match install_root.parent() {
            Some(parent) => parent.join(format!("{name}.backups")),
            None => install_root.join(".backups"),
        }
    }

    /// Resolve the scratch root for per-run workspaces, if configured.
    ///
    /// `None` means use the system temporary directory.
    #[must_use]
    pub fn scratch_root(&self) -> Option<PathBuf> {
        self.paths.scratch_dir.as_deref().map(expand_path)
    }

    /// Resolve the log file path.
    ///
    /// Uses `paths.log_file` when set; otherwise `updraft.log` inside the
    /// agent's state directory. `None` when neither can be resolved, in which
    /// case logging goes to stdout only.
    #[must_use]
    pub fn log_file_path(&self) -> Option<PathBuf> {
        if let Some(file) = &self.paths.log_file {
            return Some(expand_path(file));
        }
        Self::state_dir().ok().map(|dir| dir.join("updraft.log"))
    }

    /// Resolve the PID file path from the `[process]` section, if configured.
    #[must_use]
    pub fn pid_file_path(&self) -> Option<PathBuf> {
        self.process.pid_file.as_deref().map(expand_path)
    }
}

/// Expand a leading `~` and return the result as a path.
fn expand_path(input: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(input).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_values() {
        let config = AgentConfig::default();

        assert!(config.endpoint.package_url_template.is_none());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(300));
        assert!(!config.policies.require_backup);
        assert!(!config.policies.require_stop);
        assert!(config.process.signature.is_none());
        assert!(config.process.pid_file.is_none());
        assert_eq!(config.stop_timeout(), Duration::from_secs(10));
        assert_eq!(config.settle_delay(), Duration::from_secs(3));
        assert!(config.paths.backups_dir.is_none());
        assert!(config.scratch_root().is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("does-not-exist.toml");

        let config = AgentConfig::load_with_optional(Some(path)).await.unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("nested").join("config.toml");

        let mut config = AgentConfig::default();
        config.endpoint.package_url_template =
            Some("https://releases.example.com/update-{version}.zip".to_string());
        config.endpoint.timeout_secs = 60;
        config.policies.require_backup = true;
        config.process.signature = Some("my-app --serve".to_string());
        config.paths.backups_dir = Some("/var/backups/my-app".to_string());

        config.save_to(&config_path).await.unwrap();

        let loaded = AgentConfig::load_from(&config_path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            [policies]
            require_stop = true

            [endpoint]
            package_url_template = "https://example.com/pkg-{version}.zip"
            "#,
        )
        .unwrap();

        assert!(config.policies.require_stop);
        assert!(!config.policies.require_backup);
        assert_eq!(config.endpoint.timeout_secs, 300);
        assert_eq!(config.process.stop_timeout_secs, 10);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        tokio::fs::write(&config_path, "endpoint = \"not a table\"").await.unwrap();

        let result = AgentConfig::load_from(&config_path).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_package_url_template_required() {
        let config = AgentConfig::default();
        let err = config.package_url_template().unwrap_err();
        assert!(err.to_string().contains("package_url_template"));

        let mut config = AgentConfig::default();
        config.endpoint.package_url_template = Some("   ".to_string());
        assert!(config.package_url_template().is_err());

        config.endpoint.package_url_template =
            Some("https://example.com/pkg-{version}.zip".to_string());
        assert_eq!(
            config.package_url_template().unwrap(),
            "https://example.com/pkg-{version}.zip"
        );
    }

    #[test]
    fn test_backups_root_derived_from_install_root() {
        let config = AgentConfig::default();
        assert_eq!(
            config.backups_root_for(Path::new("/opt/my-app")),
            PathBuf::from("/opt/my-app.backups")
        );
    }

    #[test]
    fn test_backups_root_override() {
        let mut config = AgentConfig::default();
        config.paths.backups_dir = Some("/var/backups/my-app".to_string());
        assert_eq!(
            config.backups_root_for(Path::new("/opt/my-app")),
            PathBuf::from("/var/backups/my-app")
        );
    }

    #[test]
    fn test_log_file_override() {
        let mut config = AgentConfig::default();
        config.paths.log_file = Some("/var/log/updraft.log".to_string());
        assert_eq!(config.log_file_path(), Some(PathBuf::from("/var/log/updraft.log")));
    }
}
