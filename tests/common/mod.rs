//! Common test utilities and fixtures for updraft integration tests
//!
//! This module consolidates frequently used test patterns to reduce
//! duplication: an isolated installation environment, zip package
//! builders, a one-shot HTTP responder, backup seeding, and tree hashing.

// Allow dead code because these utilities are used across different test
// files and not all utilities are used in every test file
#![allow(dead_code)]

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// An isolated installation environment for one test.
///
/// Every path the agent can touch (config, install tree, backups root,
/// scratch root, log file) is pinned inside one tempdir, so tests never
/// contend and never leak state into the host.
pub struct TestInstall {
    _temp_dir: TempDir, // Keep alive for RAII cleanup
    install_root: PathBuf,
    backups_root: PathBuf,
    scratch_root: PathBuf,
    config_path: PathBuf,
}

impl TestInstall {
    /// Create the environment with an empty install root.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let install_root = temp_dir.path().join("app");
        let backups_root = temp_dir.path().join("backups");
        let scratch_root = temp_dir.path().join("scratch");
        let config_path = temp_dir.path().join("config.toml");

        let install = Self {
            _temp_dir: temp_dir,
            install_root,
            backups_root,
            scratch_root,
            config_path,
        };
        install.write_config(None)?;
        Ok(install)
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn backups_root(&self) -> &Path {
        &self.backups_root
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the agent config, pinning every path into the tempdir.
    ///
    /// `package_url_template` fills `endpoint.package_url_template` when
    /// given; without it the endpoint section stays unset and an update
    /// run fails with a config error.
    pub fn write_config(&self, package_url_template: Option<&str>) -> Result<()> {
        let endpoint = match package_url_template {
            Some(template) => {
                format!("[endpoint]\npackage_url_template = \"{template}\"\ntimeout_secs = 30\n")
            }
            None => String::from("[endpoint]\ntimeout_secs = 30\n"),
        };
        let content = format!(
            "{endpoint}\n[paths]\nbackups_dir = \"{}\"\nscratch_dir = \"{}\"\nlog_file = \"{}\"\n",
            toml_path(&self.backups_root),
            toml_path(&self.scratch_root),
            toml_path(self._temp_dir.path().join("state/updraft.log")),
        );
        fs::write(&self.config_path, content)
            .with_context(|| format!("Failed to write config to {:?}", self.config_path))?;
        Ok(())
    }

    /// Populate the install root with a plausible application tree.
    pub fn seed_install_tree(&self, version: &str) -> Result<()> {
        fs::create_dir_all(self.install_root.join("assets"))?;
        fs::write(self.install_root.join("version.txt"), format!("{version}\n"))?;
        fs::write(self.install_root.join("app.bin"), version.as_bytes())?;
        fs::write(self.install_root.join("assets/logo.dat"), b"logo")?;
        Ok(())
    }

    /// What `version.txt` currently says, or "<missing>".
    pub fn installed_version(&self) -> String {
        fs::read_to_string(self.install_root.join("version.txt"))
            .map_or_else(|_| "<missing>".to_string(), |s| s.trim().to_string())
    }

    /// Plant a snapshot under the backups root as if a previous run had
    /// taken it: `<backups>/<timestamp>/{backup.json, tree/}`.
    pub fn seed_backup(
        &self,
        timestamp: u64,
        version: &str,
        files: &[(&str, &[u8])],
    ) -> Result<PathBuf> {
        let snapshot_dir = self.backups_root.join(timestamp.to_string());
        let tree_dir = snapshot_dir.join("tree");
        fs::create_dir_all(&tree_dir)?;
        for (rel, bytes) in files {
            let path = tree_dir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, bytes)?;
        }
        let metadata = serde_json::json!({
            "timestamp": timestamp,
            "version": version,
            "backup_path": tree_dir.display().to_string(),
        });
        fs::write(
            snapshot_dir.join("backup.json"),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        Ok(tree_dir)
    }

    /// Timestamp-named snapshot directories currently under the backups
    /// root.
    pub fn backup_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.backups_root) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> =
            entries.flatten().map(|e| e.path()).filter(|p| p.is_dir()).collect();
        dirs.sort();
        dirs
    }

    /// Leftover run workspaces under the scratch root. Empty after any
    /// completed run.
    pub fn leftover_workspaces(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.scratch_root) else {
            return Vec::new();
        };
        entries.flatten().map(|e| e.path()).collect()
    }

    /// An `updraft` invocation wired to this environment's config.
    pub fn updraft_cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("updraft").expect("binary should build");
        cmd.env("UPDRAFT_CONFIG", &self.config_path).env("NO_COLOR", "1");
        cmd
    }
}

/// Render a path for embedding in a TOML string literal.
fn toml_path(path: impl AsRef<Path>) -> String {
    path.as_ref().display().to_string().replace('\\', "/")
}

/// A zip package carrying `version.txt` plus a filler binary, padded
/// comfortably past the verifier's minimum size.
pub fn build_package(version: &str) -> Vec<u8> {
    build_package_with(&[
        ("version.txt", format!("{version}\n").as_bytes()),
        ("app.bin", &[0x42u8; 2048]),
        ("assets/logo.dat", b"logo"),
    ])
}

/// A zip archive with exactly the given entries.
///
/// Entries are stored uncompressed so tests that corrupt specific byte
/// offsets stay deterministic.
pub fn build_package_with(files: &[(&str, &[u8])]) -> Vec<u8> {
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, bytes) in files {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(bytes).expect("write zip entry");
        }
        writer.finish().expect("finish zip");
    }
    cursor.into_inner()
}

/// Serve one HTTP 200 response with the given body, then exit.
///
/// Returns the server's base URL (`http://127.0.0.1:<port>`).
pub fn spawn_package_server(body: Vec<u8>) -> String {
    spawn_http_server("200 OK", body)
}

/// Serve one HTTP response with the given status line and body, then
/// exit.
pub fn spawn_http_server(status_line: &str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let status_line = status_line.to_string();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept connection");
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf).expect("read request");
        let header = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(header.as_bytes()).expect("write header");
        stream.write_all(&body).expect("write body");
    });
    format!("http://{addr}")
}

/// An address that refuses connections: bind an ephemeral port, then
/// drop the listener.
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Content hash of a directory tree: relative paths and file bytes, in
/// sorted order. Two trees hash equal iff they hold the same files with
/// the same contents.
pub fn hash_tree(root: &Path) -> String {
    let mut entries: Vec<(String, PathBuf)> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .expect("walked path is under root")
                .display()
                .to_string()
                .replace('\\', "/");
            (rel, e.path().to_path_buf())
        })
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (rel, path) in entries {
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(fs::read(&path).expect("read file for hashing"));
        hasher.update([0xffu8]);
    }
    hex::encode(hasher.finalize())
}
