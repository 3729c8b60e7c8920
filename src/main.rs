//! dsp-batch - Idempotent parallel raw-to-DSP conversion
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use dsp_batch::config::{CliArgs, Command, OutputFormat, RunArgs, RunConfig, SyncArgs, SyncConfig};
use dsp_batch::dispatch::BatchCoordinator;
use dsp_batch::progress::{print_header, print_summary, print_sync_summary, ProgressReporter};
use dsp_batch::sync::{RemoteSync, RsyncRemote};
use dsp_batch::transform::CommandTransform;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    match args.command {
        Command::Run(run_args) => run_convert(run_args, args.quiet),
        Command::Sync(sync_args) => run_sync(sync_args, args.quiet),
    }
}

/// Convert every missing output under the raw tree
fn run_convert(args: RunArgs, quiet: bool) -> Result<ExitCode> {
    let config = RunConfig::from_args(args, quiet).context("Invalid configuration")?;

    let unknown = config.unknown_channels();
    if !unknown.is_empty() {
        warn!(channels = ?unknown, "Selected channels are not in the catalog");
    }

    let show_progress = config.show_progress;
    let output_format = config.output_format;
    if show_progress && output_format == OutputFormat::Text {
        print_header(
            config.input_root(),
            config.output_root(),
            &config.config_path,
            config.worker_count,
            config.force,
        );
    }

    let transform = Arc::new(CommandTransform::from_config(&config));
    let coordinator = BatchCoordinator::new(config, transform);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing running conversions...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let discovery = coordinator.discover().context("Discovery failed")?;

    let progress = if show_progress && !discovery.items.is_empty() {
        Some(ProgressReporter::new(discovery.items.len() as u64))
    } else {
        None
    };

    let result = coordinator.dispatch(discovery, |_, summary| {
        if let Some(ref p) = progress {
            p.update(summary);
        }
    });

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish_and_clear();
            }
            return Err(e).context("Conversion aborted");
        }
    };

    if let Some(ref p) = progress {
        if summary.completed {
            p.finish("Conversion completed");
        } else {
            p.finish("Conversion interrupted");
        }
    }

    match output_format {
        OutputFormat::Text => {
            if show_progress {
                print_summary(&summary);
            }
            println!("Finished processing {} files.", summary.converted);
        }
        OutputFormat::Json => {
            println!("{}", summary.to_json().context("Failed to serialize summary")?);
        }
    }

    if !summary.completed {
        info!("Run was interrupted before completion");
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Copy the requested remote subsets
fn run_sync(args: SyncArgs, quiet: bool) -> Result<ExitCode> {
    let config = SyncConfig::from_args(args, quiet).context("Invalid configuration")?;
    let show_progress = config.show_progress;

    info!(
        host = %config.remote_host,
        prefix = %config.remote_prefix,
        combinations = config.targets().len(),
        dry_run = config.dry_run,
        "Starting sync"
    );

    let store = RsyncRemote::new(config.rsync_program.clone(), config.remote_host.clone());
    let report = RemoteSync::new(config, store).run();

    if show_progress || report.dry_run {
        print_sync_summary(&report);
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "dsp_batch=debug,warn"
    } else {
        "dsp_batch=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(verbose)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
