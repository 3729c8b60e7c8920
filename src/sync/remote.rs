//! Remote file access over rsync

use crate::error::{SyncError, SyncResult};
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use tracing::debug;

/// One line of `rsync --list-only`: mode, size, date, time, name
static LISTING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([-dlcbps])[-rwxsStT]{9}[.+@]?\s+[\d,.]+[KMGTP]?\s+\S+\s+\S+\s+(.+)$")
        .expect("Invalid listing regex")
});

/// Read-only view of a remote directory tree
pub trait RemoteStore {
    /// Names of the regular files directly inside `remote_dir`
    fn list(&self, remote_dir: &str) -> SyncResult<Vec<String>>;

    /// Copy `files` from `remote_dir` into the existing `local_dir`
    fn copy(&self, remote_dir: &str, files: &[String], local_dir: &Path) -> SyncResult<()>;
}

/// [`RemoteStore`] backed by the rsync executable
#[derive(Debug, Clone)]
pub struct RsyncRemote {
    program: String,

    /// Empty for a locally mounted prefix
    host: String,
}

impl RsyncRemote {
    pub fn new(program: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            host: host.into(),
        }
    }

    /// rsync source argument for a remote directory
    pub fn source(&self, remote_dir: &str) -> String {
        let dir = if remote_dir.ends_with('/') {
            remote_dir.to_string()
        } else {
            format!("{}/", remote_dir)
        };
        if self.host.is_empty() {
            dir
        } else {
            format!("{}:{}", self.host, dir)
        }
    }

    fn spawn_error(&self, source: std::io::Error) -> SyncError {
        SyncError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl RemoteStore for RsyncRemote {
    fn list(&self, remote_dir: &str) -> SyncResult<Vec<String>> {
        let source = self.source(remote_dir);
        debug!(source = %source, "Listing remote directory");

        let output = Command::new(&self.program)
            .arg("--list-only")
            .arg(&source)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(SyncError::ListFailed {
                remote: source,
                reason: failure_reason(&output.status, &output.stderr),
            });
        }

        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn copy(&self, remote_dir: &str, files: &[String], local_dir: &Path) -> SyncResult<()> {
        let source = self.source(remote_dir);
        debug!(source = %source, local = %local_dir.display(), files = files.len(), "Copying");

        let mut child = Command::new(&self.program)
            .args(["-hvPtz", "--files-from=-"])
            .arg(&source)
            .arg(local_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            let list = files.join("\n") + "\n";
            stdin.write_all(list.as_bytes()).map_err(|e| SyncError::CopyFailed {
                remote: source.clone(),
                local: local_dir.to_path_buf(),
                reason: format!("failed to send file list: {}", e),
            })?;
        }

        let output = child.wait_with_output().map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(SyncError::CopyFailed {
                remote: source,
                local: local_dir.to_path_buf(),
                reason: failure_reason(&output.status, &output.stderr),
            });
        }
        Ok(())
    }
}

/// Regular file names in `rsync --list-only` output
pub fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| LISTING_REGEX.captures(line.trim_end()))
        .filter(|caps| &caps[1] == "-")
        .map(|caps| caps[2].to_string())
        .filter(|name| name != "." && !name.contains('/'))
        .collect()
}

fn failure_reason(status: &std::process::ExitStatus, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => format!("{}: {}", status, line.trim()),
        None => status.to_string(),
    }
}
