//! Progress reporting for conversion runs
//!
//! Provides real-time progress display using indicatif progress bars, plus
//! the plain-text headers and summaries printed around a run.

use crate::report::RunSummary;
use crate::sync::SyncReport;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress bar over the items of one batch
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter for `total` items
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (eta {eta}) {msg}")
                .expect("Invalid progress template")
                .progress_chars("=> ")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, summary: &RunSummary) {
        self.bar.set_position(summary.processed());

        let mut msg = format!(
            "converted {} | skipped {}",
            format_number(summary.converted),
            format_number(summary.skipped),
        );
        if summary.failed > 0 {
            msg.push_str(&format!(" | {}", style(format!("failed {}", summary.failed)).red()));
        }
        self.bar.set_message(msg);
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of a conversion run
pub fn print_header(input: &Path, output: &Path, config: &Path, workers: usize, force: bool) {
    println!();
    println!(
        "{} {}",
        style("dsp-batch").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Raw:").bold(), input.display());
    println!("  {} {}", style("DSP:").bold(), output.display());
    println!("  {} {}", style("Config:").bold(), config.display());
    println!("  {} {}", style("Workers:").bold(), workers);
    if force {
        println!("  {} {}", style("Mode:").bold(), style("force").yellow());
    }
    println!();
}

/// Print a summary of a conversion run
pub fn print_summary(summary: &RunSummary) {
    let title = if !summary.completed {
        style("Run Interrupted").yellow().bold()
    } else if summary.failed > 0 {
        style("Run Complete (with failures)").yellow().bold()
    } else {
        style("Run Complete").green().bold()
    };
    let rate = if summary.duration_secs > 0.0 {
        summary.converted as f64 / summary.duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Discovered:").bold(), format_number(summary.discovered));
    println!("  {} {}", style("Converted:").bold(), format_number(summary.converted));
    println!("  {} {}", style("Skipped:").bold(), format_number(summary.skipped));
    if summary.failed > 0 {
        println!(
            "  {} {}",
            style("Failed:").red().bold(),
            format_number(summary.failed)
        );
    }
    if summary.pending > 0 {
        println!(
            "  {} {}",
            style("Pending:").yellow().bold(),
            format_number(summary.pending)
        );
    }
    println!(
        "  {} {}",
        style("Written:").bold(),
        format_size(summary.bytes_written, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.1} files/sec)",
        style("Duration:").bold(),
        summary.duration_secs,
        rate
    );
    if summary.walk_errors > 0 {
        println!(
            "  {} {}",
            style("Walk errors:").yellow().bold(),
            format_number(summary.walk_errors)
        );
    }

    for failure in &summary.failures {
        println!(
            "  {} {}: {}",
            style("✗").red(),
            failure.input.display(),
            failure.reason
        );
    }
    println!();
}

/// Print a summary of a remote sync
pub fn print_sync_summary(report: &SyncReport) {
    let title = if report.dry_run {
        style("Sync Dry Run").cyan().bold()
    } else if report.is_success() {
        style("Sync Complete").green().bold()
    } else {
        style("Sync Complete (with failures)").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    for target in &report.targets {
        match &target.error {
            None => println!(
                "  {} {} -> {} ({} files)",
                style("✓").green(),
                target.remote,
                target.local.display(),
                format_number(target.files.len() as u64)
            ),
            Some(error) => println!("  {} {}: {}", style("✗").red(), target.remote, error),
        }
        if report.dry_run {
            for file in &target.files {
                println!("      {}", style(file).dim());
            }
        }
    }
    println!("  {} {}", style("Listed:").bold(), format_number(report.files_listed));
    println!("  {} {}", style("Copied:").bold(), format_number(report.files_copied));
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        report.duration.as_secs_f64()
    );
    println!();
}
