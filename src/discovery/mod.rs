//! Work discovery
//!
//! Builds the complete list of conversions up front: every input file under
//! the raw tree paired with its mapped output path.

pub mod scanner;

pub use scanner::{Discovery, DiscoveryScanner, DiscoveryStats, WorkItem};
