//! Locating and gracefully stopping the running target application.
//!
//! File replacement while the target application is running risks locked
//! files and torn reads, so the run tries to stop it first. Discovery is
//! PID-file first: a readable PID file written by the target at startup
//! beats any matching heuristic. Command-line scanning via the platform's
//! process tooling (`pgrep` on Unix, `tasklist` on Windows) is the
//! compatibility fallback.
//!
//! Stopping is graceful only. A process that ignores the termination
//! request past its wait window is skipped, never force-killed; the
//! caller decides whether survivors abort the run. Hosts without process
//! tooling are treated as having nothing to stop.

use crate::constants::PROCESS_POLL_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// What a stop pass found and achieved.
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    /// Processes identified as the target application.
    pub matched: usize,
    /// Processes confirmed exited within the wait window.
    pub stopped: usize,
    /// PIDs that survived the window and were left running.
    pub survivors: Vec<u32>,
}

impl StopReport {
    /// True when every matched process was confirmed stopped.
    #[must_use]
    pub fn fully_stopped(&self) -> bool {
        self.survivors.is_empty()
    }
}

/// Finds and stops the running target application before the swap.
#[derive(Debug, Clone)]
pub struct ProcessController {
    signature: Option<String>,
    pid_file: Option<PathBuf>,
    stop_timeout: Duration,
    settle_delay: Duration,
}

impl ProcessController {
    /// Create a controller.
    ///
    /// `signature` is the command-line substring (image name on Windows)
    /// identifying the target; `pid_file` takes precedence over it when
    /// both are set. `stop_timeout` bounds the wait per process and
    /// `settle_delay` is the fixed pause after the pass.
    pub fn new(
        signature: Option<String>,
        pid_file: Option<PathBuf>,
        stop_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            signature,
            pid_file,
            stop_timeout,
            settle_delay,
        }
    }

    /// Stop every running instance of the target application.
    ///
    /// Sends each matched process a graceful termination request, polls
    /// for its exit up to the per-process wait window, then applies the
    /// settle delay so the OS can release file handles before the
    /// installation tree is mutated. Never returns an error: every
    /// failure mode is logged and folded into the report, and the caller
    /// applies its own policy to survivors.
    pub async fn stop_target(&self) -> StopReport {
        let pids = self.locate_targets().await;
        if pids.is_empty() {
            info!("No running target process found; nothing to stop");
            return StopReport::default();
        }

        info!("Stopping {} running target process(es): {pids:?}", pids.len());
        let mut report = StopReport {
            matched: pids.len(),
            ..StopReport::default()
        };
        for pid in pids {
            if self.stop_one(pid).await {
                report.stopped += 1;
            } else {
                report.survivors.push(pid);
            }
        }

        if !report.survivors.is_empty() {
            warn!(
                "{} process(es) survived the {}s stop window: {:?}",
                report.survivors.len(),
                self.stop_timeout.as_secs(),
                report.survivors
            );
        }

        debug!("Waiting {}s for file handles to settle", self.settle_delay.as_secs());
        tokio::time::sleep(self.settle_delay).await;
        report
    }

    /// Find PIDs belonging to the target application.
    ///
    /// A valid PID file is authoritative: if the process it names is not
    /// running, the target is down and no scan happens. Only a missing or
    /// unreadable PID file falls back to signature scanning.
    async fn locate_targets(&self) -> Vec<u32> {
        if let Some(path) = &self.pid_file {
            match read_pid_file(path).await {
                Some(pid) => {
                    if is_running(pid).await {
                        debug!("PID file {} names running process {pid}", path.display());
                        return vec![pid];
                    }
                    debug!(
                        "PID file {} names process {pid}, which is not running",
                        path.display()
                    );
                    return Vec::new();
                }
                None => {
                    debug!(
                        "PID file {} missing or unreadable; falling back to scan",
                        path.display()
                    );
                }
            }
        }

        match &self.signature {
            Some(signature) => scan_by_signature(signature).await,
            None => {
                debug!("No process signature configured");
                Vec::new()
            }
        }
    }

    /// Request termination of one process and wait for it to exit.
    async fn stop_one(&self, pid: u32) -> bool {
        debug!("Requesting termination of process {pid}");
        if !send_term(pid).await {
            // The request itself failed; if the process is already gone
            // that is a stop, otherwise it survives.
            if !is_running(pid).await {
                return true;
            }
            warn!("Termination request for process {pid} failed");
            return false;
        }

        let deadline = tokio::time::Instant::now() + self.stop_timeout;
        while tokio::time::Instant::now() < deadline {
            if !is_running(pid).await {
                debug!("Process {pid} exited");
                return true;
            }
            tokio::time::sleep(PROCESS_POLL_INTERVAL).await;
        }
        false
    }
}

/// Read and parse a PID file. `None` for missing, unreadable, or garbage.
async fn read_pid_file(path: &std::path::Path) -> Option<u32> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match content.trim().parse::<u32>() {
        Ok(pid) => Some(pid),
        Err(_) => {
            warn!("PID file {} does not contain a PID: {:?}", path.display(), content.trim());
            None
        }
    }
}

/// Enumerate processes whose command line matches `signature`.
///
/// The agent's own PID is always excluded; an update invocation that
/// mentions the target's name must not stop itself.
#[cfg(unix)]
async fn scan_by_signature(signature: &str) -> Vec<u32> {
    if which::which("pgrep").is_err() {
        info!("pgrep not available; treating as nothing to stop");
        return Vec::new();
    }

    let output = match Command::new("pgrep").arg("-f").arg(signature).output().await {
        Ok(output) => output,
        Err(e) => {
            warn!("pgrep failed to run: {e}");
            return Vec::new();
        }
    };
    // Exit code 1 means no matches; anything past that is tool failure.
    if !output.status.success() && output.status.code() != Some(1) {
        warn!("pgrep exited with {:?}", output.status.code());
        return Vec::new();
    }

    let own_pid = std::process::id();
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid != own_pid)
        .collect()
}

#[cfg(windows)]
async fn scan_by_signature(signature: &str) -> Vec<u32> {
    if which::which("tasklist").is_err() {
        info!("tasklist not available; treating as nothing to stop");
        return Vec::new();
    }

    let output =
        match Command::new("tasklist").args(["/FO", "CSV", "/NH"]).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("tasklist failed to run: {e}");
                return Vec::new();
            }
        };

    let own_pid = std::process::id();
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            // CSV row: "image","pid","session name","session#","mem"
            let mut fields = line.split("\",\"");
            let image = fields.next()?.trim_start_matches('"');
            let pid = fields.next()?.parse::<u32>().ok()?;
            image.contains(signature).then_some(pid)
        })
        .filter(|pid| *pid != own_pid)
        .collect()
}

/// Whether a process with this PID is currently running.
#[cfg(unix)]
async fn is_running(pid: u32) -> bool {
    match Command::new("kill").arg("-0").arg(pid.to_string()).output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(windows)]
async fn is_running(pid: u32) -> bool {
    let filter = format!("PID eq {pid}");
    match Command::new("tasklist").args(["/FI", &filter, "/NH"]).output().await {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
        Err(_) => false,
    }
}

/// Send a graceful termination request. True if the request was delivered.
#[cfg(unix)]
async fn send_term(pid: u32) -> bool {
    match Command::new("kill").arg("-TERM").arg(pid.to_string()).output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(windows)]
async fn send_term(pid: u32) -> bool {
    // No /F: graceful close request only.
    match Command::new("taskkill").args(["/PID", &pid.to_string()]).output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
