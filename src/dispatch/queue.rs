//! Work queue feeding the conversion pool
//!
//! The whole batch is known before dispatch starts, so the queue is filled
//! once and then closed. Workers see [`Received::Closed`] once it is both
//! closed and drained.

use crate::discovery::WorkItem;
use crate::error::WorkerError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items taken by workers
    pub dequeued: AtomicU64,
}

impl QueueStats {
    /// Items handed to workers so far
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }
}

/// Bounded queue of work items
pub struct WorkQueue {
    /// Dropped on close so receivers can observe disconnection
    sender: Option<Sender<WorkItem>>,

    receiver: Receiver<WorkItem>,

    capacity: usize,

    stats: Arc<QueueStats>,
}

impl WorkQueue {
    /// Create a new work queue with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);

        Self {
            sender: Some(sender),
            receiver,
            capacity,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Add an item, blocking while the queue is full
    pub fn push(&self, item: WorkItem) -> Result<(), WorkerError> {
        let sender = self.sender.as_ref().ok_or(WorkerError::QueueSendFailed)?;
        sender.send(item).map_err(|_| WorkerError::QueueSendFailed)?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// No more items will be pushed
    pub fn close(&mut self) {
        self.sender = None;
    }

    /// Get a receiver for this queue (clone for each worker)
    pub fn receiver(&self) -> WorkQueueReceiver {
        WorkQueueReceiver {
            receiver: self.receiver.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take every item no worker has picked up
    pub fn drain_remaining(&self) -> Vec<WorkItem> {
        self.receiver.try_iter().collect()
    }
}

/// What a worker got from the queue
#[derive(Debug)]
pub enum Received {
    Item(WorkItem),

    /// Nothing arrived within the timeout
    Idle,

    /// Closed and empty
    Closed,
}

/// Handle for receiving items from the queue
#[derive(Clone)]
pub struct WorkQueueReceiver {
    receiver: Receiver<WorkItem>,
    stats: Arc<QueueStats>,
}

impl WorkQueueReceiver {
    /// Receive with timeout so callers can poll a shutdown flag
    pub fn recv_timeout(&self, timeout: Duration) -> Received {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Received::Item(item)
            }
            Err(RecvTimeoutError::Timeout) => Received::Idle,
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(n: u32) -> WorkItem {
        WorkItem::new(format!("/raw/{}.lh5", n), format!("/dsp/{}.lh5", n))
    }

    #[test]
    fn test_queue_basic() {
        let mut queue = WorkQueue::new(10);
        queue.push(item(1)).unwrap();
        queue.push(item(2)).unwrap();
        queue.close();
        assert_eq!(queue.len(), 2);

        let receiver = queue.receiver();
        let timeout = Duration::from_millis(10);
        assert!(matches!(receiver.recv_timeout(timeout), Received::Item(i) if i == item(1)));
        assert!(matches!(receiver.recv_timeout(timeout), Received::Item(i) if i == item(2)));
        assert!(matches!(receiver.recv_timeout(timeout), Received::Closed));

        let stats = queue.stats();
        assert_eq!(stats.enqueued.load(Ordering::Relaxed), 2);
        assert_eq!(stats.throughput(), 2);
    }

    #[test]
    fn test_open_empty_queue_is_idle() {
        let queue = WorkQueue::new(4);
        let receiver = queue.receiver();
        assert!(matches!(
            receiver.recv_timeout(Duration::from_millis(5)),
            Received::Idle
        ));
    }

    #[test]
    fn test_push_after_close_fails() {
        let mut queue = WorkQueue::new(4);
        queue.close();
        assert!(matches!(queue.push(item(1)), Err(WorkerError::QueueSendFailed)));
    }

    #[test]
    fn test_drain_remaining() {
        let mut queue = WorkQueue::new(0);
        assert_eq!(queue.capacity(), 1);

        let mut queue_big = WorkQueue::new(3);
        for n in 0..3 {
            queue_big.push(item(n)).unwrap();
        }
        queue_big.close();
        let receiver = queue_big.receiver();
        let _ = receiver.recv_timeout(Duration::from_millis(5));

        assert_eq!(queue_big.drain_remaining(), vec![item(1), item(2)]);
        assert!(queue_big.is_empty());

        queue.close();
        assert!(queue.drain_remaining().is_empty());
    }
}
