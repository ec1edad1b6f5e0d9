//! Structural validation of downloaded packages.
//!
//! A package must pass three checks before anything destructive happens:
//! it exists, it is at least plausibly large, and every entry in the
//! archive reads back cleanly. The full entry scan matters: a zip whose
//! central directory opens fine can still carry truncated or corrupt
//! entry data, and discovering that mid-swap would be far more expensive
//! than discovering it here.
//!
//! This is structural validation only. There is no checksum or signature
//! cross-check against the publisher; a content digest is computed and
//! logged for manual comparison.

use crate::constants::MIN_PACKAGE_SIZE_BYTES;
use crate::core::UpdraftError;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// What a successful verification learned about the package.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Number of entries in the archive.
    pub entry_count: usize,
    /// Sum of uncompressed entry sizes.
    pub total_uncompressed: u64,
    /// SHA-256 of the archive file, hex encoded. Logged for operators to
    /// compare against the publisher's release notes by hand.
    pub sha256: String,
}

/// Validates that a downloaded archive is safe to extract.
#[derive(Debug, Clone)]
pub struct IntegrityVerifier {
    min_size: u64,
}

impl Default for IntegrityVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrityVerifier {
    /// Create a verifier with the standard minimum-size threshold.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_size: MIN_PACKAGE_SIZE_BYTES,
        }
    }

    /// Run all checks against the archive at `archive_path`.
    ///
    /// Checks, in order:
    /// 1. the file exists and is readable,
    /// 2. its size meets the minimum-plausible threshold (truncated and
    ///    empty downloads fail here),
    /// 3. every archive entry decompresses with a matching checksum.
    ///
    /// The entry scan reads the whole archive and runs on a blocking
    /// thread.
    ///
    /// # Errors
    ///
    /// Returns [`UpdraftError::IntegrityError`] naming the failed check.
    pub async fn verify(&self, archive_path: &Path) -> Result<VerificationReport, UpdraftError> {
        let path_display = archive_path.display().to_string();

        let metadata = tokio::fs::metadata(archive_path).await.map_err(|e| {
            UpdraftError::IntegrityError {
                path: path_display.clone(),
                reason: format!("package file is missing or unreadable: {e}"),
            }
        })?;

        let size = metadata.len();
        if size < self.min_size {
            return Err(UpdraftError::IntegrityError {
                path: path_display,
                reason: format!(
                    "package is {size} bytes, below the {MIN_PACKAGE_SIZE_BYTES} byte minimum"
                ),
            });
        }

        let path = archive_path.to_path_buf();
        let report = tokio::task::spawn_blocking(move || scan_archive(&path))
            .await
            .map_err(|e| UpdraftError::Other {
                message: format!("verification task panicked: {e}"),
            })??;

        info!(
            "Package {path_display} passed integrity checks: {} entries, {} bytes uncompressed, sha256 {}",
            report.entry_count, report.total_uncompressed, report.sha256
        );
        Ok(report)
    }
}

/// Read every entry to completion and hash the raw archive bytes.
fn scan_archive(archive_path: &Path) -> Result<VerificationReport, UpdraftError> {
    let path_display = archive_path.display().to_string();
    let integrity_error = |reason: String| UpdraftError::IntegrityError {
        path: path_display.clone(),
        reason,
    };

    let file = std::fs::File::open(archive_path)
        .map_err(|e| integrity_error(format!("package cannot be opened: {e}")))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| integrity_error(format!("archive directory is unreadable: {e}")))?;

    if archive.is_empty() {
        return Err(integrity_error("archive contains no entries".to_string()));
    }

    let mut total_uncompressed: u64 = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| integrity_error(format!("entry {i} is unreadable: {e}")))?;
        // Reading an entry to the end validates its checksum.
        let bytes = std::io::copy(&mut entry, &mut std::io::sink())
            .map_err(|e| integrity_error(format!("entry {i} ({}) is corrupt: {e}", entry.name())))?;
        total_uncompressed += bytes;
    }
    let entry_count = archive.len();

    let raw = std::fs::read(archive_path)
        .map_err(|e| integrity_error(format!("package cannot be read for hashing: {e}")))?;
    let sha256 = hex::encode(Sha256::digest(&raw));

    Ok(VerificationReport {
        entry_count,
        total_uncompressed,
        sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_test_zip(path: &Path, files: &[(&str, &[u8])]) {
        // Stored entries keep on-disk offsets predictable for the
        // corruption tests below.
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    fn corrupt_byte_at(path: &Path, offset: usize) {
        let mut bytes = std::fs::read(path).unwrap();
        bytes[offset] ^= 0xFF;
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn test_rejects_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = IntegrityVerifier::new()
            .verify(&temp.path().join("no-such.zip"))
            .await
            .unwrap_err();

        assert!(matches!(err, UpdraftError::IntegrityError { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_rejects_zero_byte_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.zip");
        std::fs::write(&path, b"").unwrap();

        let err = IntegrityVerifier::new().verify(&path).await.unwrap_err();
        match err {
            UpdraftError::IntegrityError { reason, .. } => {
                assert!(reason.contains("0 bytes"), "unexpected reason: {reason}");
            }
            other => panic!("expected IntegrityError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_undersized_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("small.zip");
        std::fs::write(&path, vec![0u8; 500]).unwrap();

        let err = IntegrityVerifier::new().verify(&path).await.unwrap_err();
        match err {
            UpdraftError::IntegrityError { reason, .. } => {
                assert!(reason.contains("500 bytes"), "unexpected reason: {reason}");
            }
            other => panic!("expected IntegrityError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_corrupted_archive_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pkg.zip");
        write_test_zip(&path, &[("app.bin", &vec![7u8; 2048])]);

        // The end-of-central-directory record sits at the tail.
        let len = std::fs::metadata(&path).unwrap().len() as usize;
        for offset in (len - 12)..len {
            corrupt_byte_at(&path, offset);
        }

        let err = IntegrityVerifier::new().verify(&path).await.unwrap_err();
        assert!(matches!(err, UpdraftError::IntegrityError { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_rejects_corrupted_entry_data() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pkg.zip");
        write_test_zip(&path, &[("app.bin", &vec![7u8; 4096])]);

        // Flip a byte in the middle of the entry payload, leaving the
        // central directory intact so only the per-entry scan can catch it.
        corrupt_byte_at(&path, 1024);

        let err = IntegrityVerifier::new().verify(&path).await.unwrap_err();
        assert!(matches!(err, UpdraftError::IntegrityError { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_accepts_well_formed_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pkg.zip");
        write_test_zip(
            &path,
            &[
                ("version.txt", b"2.1.0\n".as_slice()),
                ("app.bin", &vec![7u8; 2048]),
                ("assets/logo.dat", &vec![9u8; 512]),
            ],
        );

        let report = IntegrityVerifier::new().verify(&path).await.unwrap();
        assert_eq!(report.entry_count, 3);
        assert_eq!(report.total_uncompressed, 6 + 2048 + 512);
        assert_eq!(report.sha256.len(), 64);
    }
}
