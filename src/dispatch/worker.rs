//! Worker thread logic for parallel conversion
//!
//! Each worker:
//! - Pulls work items from the shared queue
//! - Runs the conversion through the [`ConversionInvoker`]
//! - Sends one [`ItemReport`] per item back to the coordinator
//! - Stops taking new items once the shutdown flag is set

use crate::config::ErrorPolicy;
use crate::discovery::WorkItem;
use crate::dispatch::queue::{Received, WorkQueueReceiver};
use crate::error::{ItemOutcome, TransformError, WorkerError};
use crate::invoker::{ConversionInvoker, InvokeResult};
use crossbeam_channel::Sender;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long a worker waits for an item before re-checking shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one work item, as sent to the coordinator
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub item: WorkItem,
    pub outcome: ItemOutcome,

    /// Worker that handled the item
    pub worker: usize,

    /// Transform calls made (0 for skipped items)
    pub attempts: u32,

    pub elapsed: Duration,
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub converted: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
}

impl WorkerStats {
    fn record(&self, outcome: &ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Converted => &self.converted,
            ItemOutcome::Skipped => &self.skipped,
            ItemOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn processed(&self) -> u64 {
        self.converted.load(Ordering::Relaxed)
            + self.skipped.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }
}

/// A worker thread that converts queued items
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        invoker: Arc<ConversionInvoker>,
        queue_rx: WorkQueueReceiver,
        results: Sender<ItemReport>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("convert-{}", id))
            .spawn(move || worker_loop(id, invoker, queue_rx, results, shutdown, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|payload| WorkerError::Panicked {
                id: self.id,
                message: panic_message(payload.as_ref()),
            }),
            None => Ok(()),
        }
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    invoker: Arc<ConversionInvoker>,
    queue_rx: WorkQueueReceiver,
    results: Sender<ItemReport>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "Worker starting");

    while !shutdown.load(Ordering::Relaxed) {
        let item = match queue_rx.recv_timeout(POLL_INTERVAL) {
            Received::Item(item) => item,
            Received::Idle => continue,
            Received::Closed => break,
        };

        let start = Instant::now();
        let InvokeResult { outcome, attempts } = invoke_guarded(&invoker, &item);
        stats.record(&outcome);

        // Stop this worker's next pickup without waiting for the coordinator
        if outcome.is_failed() && invoker.config().error_policy == ErrorPolicy::Abort {
            shutdown.store(true, Ordering::SeqCst);
        }

        match &outcome {
            ItemOutcome::Converted => {
                debug!(worker = id, input = %item.input.display(), attempts = attempts, "Converted");
            }
            ItemOutcome::Skipped => {
                debug!(worker = id, input = %item.input.display(), "Skipped");
            }
            ItemOutcome::Failed { reason } => {
                warn!(worker = id, input = %item.input.display(), error = %reason, "Conversion failed");
            }
        }

        let report = ItemReport {
            item,
            outcome,
            worker: id,
            attempts,
            elapsed: start.elapsed(),
        };
        if results.send(report).is_err() {
            // Coordinator is gone, nobody left to report to
            break;
        }
    }

    info!(worker = id, processed = stats.processed(), "Worker shutting down");
}

/// A panicking transform fails its item instead of the worker
fn invoke_guarded(invoker: &ConversionInvoker, item: &WorkItem) -> InvokeResult {
    match panic::catch_unwind(AssertUnwindSafe(|| invoker.invoke(item))) {
        Ok(result) => result,
        Err(payload) => InvokeResult {
            outcome: ItemOutcome::Failed {
                reason: TransformError::Panicked(panic_message(payload.as_ref())).to_string(),
            },
            attempts: 1,
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Aggregate (converted, skipped, failed) over all workers
pub fn aggregate_stats(workers: &[Worker]) -> (u64, u64, u64) {
    workers.iter().fold((0, 0, 0), |(c, s, f), worker| {
        (
            c + worker.stats.converted.load(Ordering::Relaxed),
            s + worker.stats.skipped.load(Ordering::Relaxed),
            f + worker.stats.failed.load(Ordering::Relaxed),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::dispatch::queue::WorkQueue;
    use crate::mapper::TierMapping;
    use crate::transform::{Transform, TransformRequest};
    use crossbeam_channel::unbounded;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::default();
        stats.record(&ItemOutcome::Converted);
        stats.record(&ItemOutcome::Skipped);
        stats.record(&ItemOutcome::Failed { reason: "x".into() });
        stats.record(&ItemOutcome::Converted);

        assert_eq!(stats.converted.load(Ordering::Relaxed), 2);
        assert_eq!(stats.skipped.load(Ordering::Relaxed), 1);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.processed(), 4);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_worker_drains_queue_and_survives_panic() {
        let dir = tempdir().unwrap();
        let dsp = dir.path().join("dsp");
        fs::create_dir_all(&dsp).unwrap();

        let config = RunConfig::new(
            TierMapping::new(dir.path().join("raw"), &dsp, "raw", "dsp"),
            dir.path().join("dsp.json"),
        );
        let transform: Arc<dyn Transform> = Arc::new(|req: &TransformRequest<'_>| {
            if req.input.ends_with("bad.lh5") {
                panic!("corrupt header");
            }
            fs::write(req.output, b"dsp").map_err(|e| TransformError::Other(e.to_string()))
        });
        let invoker = Arc::new(ConversionInvoker::new(Arc::new(config), transform));

        let mut queue = WorkQueue::new(3);
        for name in ["a.lh5", "bad.lh5", "c.lh5"] {
            queue
                .push(WorkItem::new(dir.path().join("raw").join(name), dsp.join(name)))
                .unwrap();
        }
        queue.close();

        let (tx, rx) = unbounded();
        let worker = Worker::spawn(
            0,
            invoker,
            queue.receiver(),
            tx,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        let reports: Vec<ItemReport> = rx.iter().collect();
        assert_eq!(reports.len(), 3);
        let failed: Vec<_> = reports.iter().filter(|r| r.outcome.is_failed()).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].item.input.ends_with("bad.lh5"));
        assert_eq!(worker.stats().converted.load(Ordering::Relaxed), 2);
        assert_eq!(worker.id(), 0);
        assert!(worker.join().is_ok());
    }
}
