//! Run summary
//!
//! Counters and failure list folded from worker reports, serializable for
//! `--format json`.

use crate::discovery::DiscoveryStats;
use crate::dispatch::ItemReport;
use crate::error::ItemOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// One item that failed every attempt
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedItem {
    pub input: PathBuf,
    pub output: PathBuf,
    pub reason: String,
    pub attempts: u32,

    /// Worker that ran the last attempt
    pub worker: usize,

    /// Wall time spent on the item, retries included
    pub elapsed_secs: f64,
}

/// Totals of a conversion run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Work items found by discovery
    pub discovered: u64,
    pub converted: u64,
    pub skipped: u64,
    pub failed: u64,

    /// Items never picked up because the run stopped early
    pub pending: u64,

    /// Size of all outputs written in this run
    pub bytes_written: u64,

    pub dirs_created: u64,
    pub walk_errors: u64,
    pub failures: Vec<FailedItem>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,

    /// Every discovered item reached a terminal outcome
    pub completed: bool,
}

impl RunSummary {
    pub fn new(discovered: u64, stats: &DiscoveryStats) -> Self {
        Self {
            discovered,
            converted: 0,
            skipped: 0,
            failed: 0,
            pending: 0,
            bytes_written: 0,
            dirs_created: stats.dirs_created,
            walk_errors: stats.walk_errors,
            failures: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            duration_secs: 0.0,
            completed: false,
        }
    }

    /// Fold one item report into the totals
    pub fn record(&mut self, report: &ItemReport) {
        match &report.outcome {
            ItemOutcome::Converted => {
                self.converted += 1;
                if let Ok(meta) = fs::metadata(&report.item.output) {
                    self.bytes_written += meta.len();
                }
            }
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed { reason } => {
                self.failed += 1;
                self.failures.push(FailedItem {
                    input: report.item.input.clone(),
                    output: report.item.output.clone(),
                    reason: reason.clone(),
                    attempts: report.attempts,
                    worker: report.worker,
                    elapsed_secs: report.elapsed.as_secs_f64(),
                });
            }
        }
    }

    /// Stamp the end of the run
    pub fn finish(&mut self, pending: u64) {
        let now = Utc::now();
        self.pending = pending;
        self.completed = pending == 0 && self.processed() == self.discovered;
        self.duration_secs = (now - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.finished_at = Some(now);
    }

    /// Items that reached a terminal outcome
    pub fn processed(&self) -> u64 {
        self.converted + self.skipped + self.failed
    }

    /// Completed with no failed item
    pub fn is_success(&self) -> bool {
        self.completed && self.failed == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
