//! Persisted version descriptor for the installed application.
//!
//! The installation root carries a `version.txt` containing a single
//! semantic-version line. The release packager writes it (the file ships
//! inside each update archive); the agent only reads it to report what is
//! currently installed and to label backups.

use crate::constants::VERSION_FILE_NAME;
use crate::utils::atomic_write;
use anyhow::Result;
use semver::Version;
use std::path::PathBuf;
use tracing::warn;

/// Reads and writes the `version.txt` descriptor under an installation root.
#[derive(Debug, Clone)]
pub struct VersionStore {
    install_root: PathBuf,
}

impl VersionStore {
    /// Create a store for the given installation root.
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
        }
    }

    /// Path of the version file under the installation root.
    #[must_use]
    pub fn version_file(&self) -> PathBuf {
        self.install_root.join(VERSION_FILE_NAME)
    }

    /// Read the installed version, failing soft to `0.0.0`.
    ///
    /// A missing file, unreadable file, or unparseable content yields
    /// `0.0.0` rather than an error: version lookup must never block an
    /// update attempt. Parse failures are logged so a corrupt descriptor
    /// does not go unnoticed.
    #[must_use]
    pub fn read(&self) -> Version {
        let path = self.version_file();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Could not read version file {}: {e}; assuming 0.0.0",
                    path.display()
                );
                return Version::new(0, 0, 0);
            }
        };

        let line = content.trim();
        match Version::parse(line) {
            Ok(version) => version,
            Err(e) => {
                warn!(
                    "Version file {} contains {line:?}, not a semantic version ({e}); assuming 0.0.0",
                    path.display()
                );
                Version::new(0, 0, 0)
            }
        }
    }

    /// Write the version descriptor atomically.
    ///
    /// Not used by the update transaction itself (each archive ships its own
    /// `version.txt`); exposed for the release-side tooling that provisions
    /// installations.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, version: &Version) -> Result<()> {
        atomic_write(&self.version_file(), format!("{version}\n").as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_file_yields_zero() {
        let temp = TempDir::new().unwrap();
        let store = VersionStore::new(temp.path());

        assert_eq!(store.read(), Version::new(0, 0, 0));
    }

    #[test]
    fn test_read_garbage_yields_zero() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(VERSION_FILE_NAME), "not a version").unwrap();
        let store = VersionStore::new(temp.path());

        assert_eq!(store.read(), Version::new(0, 0, 0));
    }

    #[test]
    fn test_read_trims_whitespace() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(VERSION_FILE_NAME), "2.0.0\n").unwrap();
        let store = VersionStore::new(temp.path());

        assert_eq!(store.read(), Version::new(2, 0, 0));
    }

    #[test]
    fn test_write_read_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = VersionStore::new(temp.path().join("app"));

        store.write(&Version::new(2, 1, 0)).unwrap();
        assert_eq!(store.read(), Version::new(2, 1, 0));

        let raw = std::fs::read_to_string(store.version_file()).unwrap();
        assert_eq!(raw, "2.1.0\n");
    }
}
