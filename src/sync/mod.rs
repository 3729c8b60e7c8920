//! Remote synchronisation of tier/type/period/run subsets
//!
//! Every combination of the requested tiers, data types, periods and runs
//! names one directory below the remote prefix. Each is listed and copied
//! into the same relative location under the local prefix. Combinations
//! are independent: a failed one is recorded and the rest still run.

pub mod remote;

pub use remote::{parse_listing, RemoteStore, RsyncRemote};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One tier/type/period/run combination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncTarget {
    pub tier: String,
    pub data_type: String,
    pub period: String,
    pub run: String,
}

impl SyncTarget {
    pub fn new(tier: &str, data_type: &str, period: &str, run: &str) -> Self {
        Self {
            tier: tier.to_string(),
            data_type: data_type.to_string(),
            period: period.to_string(),
            run: run.to_string(),
        }
    }

    /// `tier/type/period/run`
    pub fn relative(&self) -> PathBuf {
        [&self.tier, &self.data_type, &self.period, &self.run]
            .iter()
            .collect()
    }

    /// Remote directory, always ending in `/`
    pub fn remote_dir(&self, prefix: &str) -> String {
        let mut dir = prefix.to_string();
        if !dir.is_empty() && !dir.ends_with('/') {
            dir.push('/');
        }
        dir.push_str(&self.to_string());
        dir.push('/');
        dir
    }

    pub fn local_dir(&self, prefix: &Path) -> PathBuf {
        prefix.join(self.relative())
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.tier, self.data_type, self.period, self.run)
    }
}

/// Outcome for one combination
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: SyncTarget,
    pub remote: String,
    pub local: PathBuf,

    /// Files selected for copying (listed only, in a dry run)
    pub files: Vec<String>,

    pub error: Option<String>,
}

/// Result of a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub targets: Vec<TargetReport>,
    pub files_listed: u64,
    pub files_copied: u64,
    pub dry_run: bool,
    pub failures: u64,
    pub duration: Duration,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures == 0
    }
}

/// Copies every requested combination from a [`RemoteStore`]
pub struct RemoteSync<R: RemoteStore> {
    config: SyncConfig,
    store: R,
}

impl<R: RemoteStore> RemoteSync<R> {
    pub fn new(config: SyncConfig, store: R) -> Self {
        Self { config, store }
    }

    /// Sync all combinations, continuing past failed ones
    pub fn run(&self) -> SyncReport {
        let start = Instant::now();
        let mut report = SyncReport {
            dry_run: self.config.dry_run,
            ..SyncReport::default()
        };
        let mut budget = self.config.max_files;

        for target in self.config.targets() {
            if budget == Some(0) {
                info!("File limit reached, skipping remaining combinations");
                break;
            }

            let remote = target.remote_dir(&self.config.remote_prefix);
            let local = target.local_dir(&self.config.local_prefix);

            let (files, error) = match self.sync_target(&remote, &local, &mut budget, &mut report) {
                Ok(files) => (files, None),
                Err(e) => {
                    warn!(target = %target, error = %e, "Sync failed");
                    report.failures += 1;
                    (Vec::new(), Some(e.to_string()))
                }
            };

            report.targets.push(TargetReport {
                target,
                remote,
                local,
                files,
                error,
            });
        }

        report.duration = start.elapsed();
        info!(
            listed = report.files_listed,
            copied = report.files_copied,
            failures = report.failures,
            "Sync finished"
        );
        report
    }

    fn sync_target(
        &self,
        remote: &str,
        local: &Path,
        budget: &mut Option<usize>,
        report: &mut SyncReport,
    ) -> SyncResult<Vec<String>> {
        let mut files = self.store.list(remote)?;
        files.sort();
        if let Some(left) = budget {
            files.truncate(*left);
            *left -= files.len();
        }
        report.files_listed += files.len() as u64;

        if self.config.dry_run || files.is_empty() {
            info!(remote = %remote, files = files.len(), "Listed");
            return Ok(files);
        }

        fs::create_dir_all(local).map_err(|source| SyncError::CreateDir {
            path: local.to_path_buf(),
            source,
        })?;
        self.store.copy(remote, &files, local)?;
        report.files_copied += files.len() as u64;

        info!(remote = %remote, local = %local.display(), files = files.len(), "Copied");
        Ok(files)
    }
}
