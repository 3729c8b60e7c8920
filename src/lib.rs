//! dsp-batch - Idempotent parallel conversion of raw detector data
//!
//! Walks a tree of raw data files, maps every file into a mirrored tree for
//! the next processing tier and runs a conversion on each file whose output
//! does not exist yet. Re-running over the same tree only converts what is
//! missing.
//!
//! # Features
//!
//! - **Idempotent**: existing outputs are skipped unless `--force` is given.
//!   Outputs are written to a hidden temporary file and renamed into place,
//!   so an interrupted run never leaves a half-written output behind.
//!
//! - **Parallel**: a fixed pool of worker threads, each running one external
//!   conversion process at a time.
//!
//! - **Failure isolation**: a failed file is recorded and the batch goes on,
//!   or the run stops at the first failure with `--on-error abort`.
//!
//! - **Remote sync**: the `sync` subcommand copies tier/type/period/run
//!   subsets from the production area with rsync.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Raw tree (…/tier_raw/…/*.lh5)                   │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ walkdir
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   DiscoveryScanner: filter, TierMapping, create output dirs     │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ Vec<WorkItem>
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Work Queue (crossbeam)                      │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 0 │  │Worker 1 │  │Worker 2 │  ...    │Worker N │     │
//! │  │ invoker │  │ invoker │  │ invoker │         │ invoker │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       └────────────┴─── ItemReport ─────────────────┘          │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//!                    ┌──────────────────┐
//!                    │    RunSummary    │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Convert everything that is missing
//! dsp-batch run --rawdir /data/tier_raw --dspdir /data/tier_dsp --config dsp.json
//!
//! # Only two channels, reconverting existing outputs
//! dsp-batch run --rawdir raw --dspdir dsp --config dsp.json --sipms S061 S055 --force
//!
//! # Fetch a run first
//! dsp-batch sync --local-prefix /scratch/ --tier raw --type phy --period p15 --run r004
//! ```

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod invoker;
pub mod mapper;
pub mod progress;
pub mod report;
pub mod sync;
pub mod transform;

pub use catalog::ChannelCatalog;
pub use config::{CliArgs, ErrorPolicy, OutputFormat, RunConfig, SyncConfig};
pub use discovery::{Discovery, WorkItem};
pub use dispatch::{BatchCoordinator, ItemReport};
pub use error::{BatchError, ItemOutcome, Result};
pub use invoker::ConversionInvoker;
pub use mapper::TierMapping;
pub use report::RunSummary;
pub use sync::{RemoteSync, RsyncRemote, SyncReport};
pub use transform::{CommandTransform, Transform, TransformRequest};
