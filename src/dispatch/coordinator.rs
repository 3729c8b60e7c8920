//! Batch coordinator - orchestrates discovery and parallel conversion
//!
//! The coordinator is responsible for:
//! - Running discovery and preparing output directories
//! - Setting up the work queue and workers
//! - Folding worker reports into the run summary
//! - Applying the failure policy
//! - Signal handling (graceful shutdown)

use crate::config::{ErrorPolicy, RunConfig};
use crate::discovery::{Discovery, DiscoveryScanner};
use crate::dispatch::queue::WorkQueue;
use crate::dispatch::worker::{aggregate_stats, ItemReport, Worker};
use crate::error::{BatchError, ItemOutcome, Result};
use crate::invoker::ConversionInvoker;
use crate::report::RunSummary;
use crate::transform::Transform;
use crossbeam_channel::unbounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Coordinates one conversion run
pub struct BatchCoordinator {
    config: Arc<RunConfig>,
    invoker: Arc<ConversionInvoker>,
    shutdown: Arc<AtomicBool>,
}

impl BatchCoordinator {
    pub fn new(config: RunConfig, transform: Arc<dyn Transform>) -> Self {
        let config = Arc::new(config);
        let invoker = Arc::new(ConversionInvoker::new(Arc::clone(&config), transform));

        Self {
            config,
            invoker,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Enumerate work items and create their output directories
    pub fn discover(&self) -> Result<Discovery> {
        Ok(DiscoveryScanner::new(&self.config).scan()?)
    }

    /// Discover, then convert everything that needs it
    pub fn run<F>(&self, on_report: F) -> Result<RunSummary>
    where
        F: FnMut(&ItemReport, &RunSummary),
    {
        let discovery = self.discover()?;
        self.dispatch(discovery, on_report)
    }

    /// Convert a discovered batch on the worker pool
    ///
    /// `on_report` is called on the calling thread after each item's report
    /// has been folded into the summary, in completion order.
    pub fn dispatch<F>(&self, discovery: Discovery, mut on_report: F) -> Result<RunSummary>
    where
        F: FnMut(&ItemReport, &RunSummary),
    {
        let Discovery { items, stats } = discovery;
        let mut summary = RunSummary::new(items.len() as u64, &stats);

        if items.is_empty() {
            info!("No input files found");
            summary.finish(0);
            return Ok(summary);
        }

        let pool_size = self.config.worker_count.clamp(1, items.len());
        info!(
            items = items.len(),
            workers = pool_size,
            force = self.config.force,
            "Starting conversion"
        );

        let mut queue = WorkQueue::new(items.len());
        for item in items {
            queue.push(item)?;
        }
        queue.close();

        let (results_tx, results_rx) = unbounded();
        let mut workers = Vec::with_capacity(pool_size);
        for id in 0..pool_size {
            let spawned = Worker::spawn(
                id,
                Arc::clone(&self.invoker),
                queue.receiver(),
                results_tx.clone(),
                Arc::clone(&self.shutdown),
            );
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    self.shutdown.store(true, Ordering::SeqCst);
                    drop(results_tx);
                    join_workers(workers);
                    return Err(e.into());
                }
            }
        }
        // Workers hold the only senders now; the loop ends when they all exit
        drop(results_tx);

        let mut first_failure: Option<(ItemReport, String)> = None;
        for report in results_rx.iter() {
            summary.record(&report);
            on_report(&report, &summary);

            if let ItemOutcome::Failed { reason } = &report.outcome {
                if self.config.error_policy == ErrorPolicy::Abort && first_failure.is_none() {
                    warn!(input = %report.item.input.display(), "Aborting after failure");
                    self.shutdown.store(true, Ordering::SeqCst);
                    first_failure = Some((report.clone(), reason.clone()));
                }
            }
        }

        let (converted, skipped, failed) = aggregate_stats(&workers);
        join_workers(workers);

        let pending = queue.drain_remaining().len() as u64;
        summary.finish(pending);

        info!(
            converted = converted,
            skipped = skipped,
            failed = failed,
            pending = pending,
            duration_secs = summary.duration_secs,
            "Conversion finished"
        );

        if let Some((report, reason)) = first_failure {
            return Err(BatchError::Aborted {
                input: report.item.input,
                reason,
                converted: summary.converted,
            });
        }

        if !summary.completed {
            warn!(pending = pending, "Run interrupted before all items were processed");
        }

        Ok(summary)
    }
}

fn join_workers(workers: Vec<Worker>) {
    for worker in workers {
        if let Err(e) = worker.join() {
            warn!(error = %e, "Worker failed to join cleanly");
        }
    }
}
