//! Package retrieval from the release endpoint.
//!
//! Downloads stream straight to a file in the run workspace as chunks
//! arrive; packages can be tens of megabytes, so nothing is buffered in
//! memory. A failed or timed-out download is the cheapest point to fail
//! in the whole update: the installation has not been touched yet.

use crate::core::UpdraftError;
use semver::Version;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// A fetched update archive and everything known about it.
///
/// Created by [`PackageFetcher::fetch`], consumed by the apply phase, and
/// deleted with the run workspace that holds it. Owned exclusively by the
/// run that downloaded it.
#[derive(Debug, Clone)]
pub struct UpdatePackage {
    /// On-disk location of the downloaded archive.
    pub archive_path: PathBuf,
    /// URL the archive was retrieved from.
    pub source_url: String,
    /// Version this package claims to carry.
    pub version: Version,
    /// Size of the archive on disk.
    pub size_bytes: u64,
}

/// Downloads release packages keyed by target version.
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    client: reqwest::Client,
    url_template: String,
    timeout: Duration,
}

impl PackageFetcher {
    /// Create a fetcher for the given URL template.
    ///
    /// The template's `{version}` placeholder is substituted per fetch.
    /// `timeout` bounds each whole transfer, connection through final body
    /// byte, not just connection establishment.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, UpdraftError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("updraft/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url_template: url_template.into(),
            timeout,
        })
    }

    /// Resolve the download URL for a target version.
    #[must_use]
    pub fn package_url(&self, version: &Version) -> String {
        self.url_template.replace("{version}", &version.to_string())
    }

    /// Download the package for `version` into `download_dir`.
    ///
    /// Streams the response body to `update-<version>.zip` chunk by chunk.
    /// No file is created until the server has answered with a success
    /// status, so an aborted fetch leaves the download directory empty.
    ///
    /// # Errors
    ///
    /// Returns [`UpdraftError::DownloadTimeout`] when the transfer exceeds
    /// the configured deadline and [`UpdraftError::TransportError`] for
    /// connection failures and non-success status codes.
    pub async fn fetch(
        &self,
        version: &Version,
        download_dir: &Path,
    ) -> Result<UpdatePackage, UpdraftError> {
        let url = self.package_url(version);
        info!("Downloading update package from {url}");

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdraftError::TransportError {
                url,
                reason: format!("server returned HTTP {status}"),
            });
        }

        let archive_path = download_dir.join(format!("update-{version}.zip"));
        let mut file = tokio::fs::File::create(&archive_path).await?;

        let mut size_bytes: u64 = 0;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk).await?;
                    size_bytes += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(e) => return Err(self.map_transport_error(&url, &e)),
            }
        }
        file.flush().await?;

        debug!("Wrote {size_bytes} bytes to {}", archive_path.display());
        Ok(UpdatePackage {
            archive_path,
            source_url: url,
            version: version.clone(),
            size_bytes,
        })
    }

    fn map_transport_error(&self, url: &str, e: &reqwest::Error) -> UpdraftError {
        if e.is_timeout() {
            UpdraftError::DownloadTimeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            UpdraftError::TransportError {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}
