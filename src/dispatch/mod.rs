//! Parallel dispatch of conversions
//!
//! The coordinator fills a work queue with every discovered item, then a
//! fixed pool of worker threads drains it. Each worker reports one
//! [`ItemReport`] per item back over a results channel, which the
//! coordinator folds into the run summary in completion order.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │    BatchCoordinator     │
//!                     │  - discovery            │
//!                     │  - result aggregation   │
//!                     └───────────┬─────────────┘
//!                                 │ WorkQueue
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │ convert-0 │             │ convert-1 │             │ convert-N │
//! │ invoker   │             │ invoker   │             │ invoker   │
//! └─────┬─────┘             └─────┬─────┘             └─────┬─────┘
//!       └──────────── ItemReport ─┴─────────────────────────┘
//! ```

pub mod coordinator;
pub mod queue;
pub mod worker;

pub use coordinator::BatchCoordinator;
pub use queue::{QueueStats, Received, WorkQueue, WorkQueueReceiver};
pub use worker::{aggregate_stats, ItemReport, Worker, WorkerStats};
