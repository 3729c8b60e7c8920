//! Error types for dsp-batch
//!
//! This module defines the error hierarchy for:
//! - Configuration and CLI validation
//! - Work discovery (walking the input tree, creating output directories)
//! - The external conversion transform
//! - Worker threads and the dispatch loop
//! - Remote synchronisation
//!
//! Library code returns these `thiserror` types; the binary wraps them in
//! `anyhow` for reporting. Transform failures never surface as a
//! `BatchError` on their own: they end up in an [`ItemOutcome`], and sync
//! failures in the per-target report.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the dsp-batch library
#[derive(Error, Debug)]
pub enum BatchError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Discovery errors
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// The run was stopped after the first failed item
    #[error("Run aborted after '{input}' failed ({converted} converted before abort): {reason}")]
    Aborted {
        input: PathBuf,
        reason: String,
        converted: u64,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The transform configuration file does not exist or is not a file
    #[error("No file: {}", path.display())]
    MissingConfigFile { path: PathBuf },

    /// Input root missing or not a directory
    #[error("Invalid input directory '{}': {reason}", path.display())]
    InvalidInputRoot { path: PathBuf, reason: String },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Empty extension filter
    #[error("File extension filter must not be empty")]
    EmptyExtension,

    /// Empty tier token
    #[error("Tier token '{name}' must not be empty")]
    EmptyTierToken { name: &'static str },

    /// Output tree would overwrite the input tree
    #[error("Output tree '{}' aliases the input tree: use a different output root or tier token", path.display())]
    OutputAliasesInput { path: PathBuf },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Channel catalog could not be loaded
    #[error("Invalid channel catalog '{}': {reason}", path.display())]
    InvalidCatalog { path: PathBuf, reason: String },

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Discovery (work enumeration) errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Failed to create an output directory
    #[error("Failed to create output directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the input root itself
    #[error("Failed to read input root '{}': {reason}", path.display())]
    RootUnreadable { path: PathBuf, reason: String },
}

/// Errors raised while converting a single file
#[derive(Error, Debug)]
pub enum TransformError {
    /// The transform program could not be started
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The transform program exited unsuccessfully
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The transform reported success but wrote nothing
    #[error("Transform reported success but produced no output at '{}'", path.display())]
    MissingOutput { path: PathBuf },

    /// Moving the finished output into place failed
    #[error("Failed to finalize '{}': {source}", path.display())]
    Finalize {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The transform panicked inside a worker
    #[error("Transform panicked: {0}")]
    Panicked(String),

    /// Any other transform-specific failure
    #[error("{0}")]
    Other(String),
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Work queue send failed
    #[error("Failed to send work item: queue closed")]
    QueueSendFailed,
}

/// Remote sync errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote listing failed
    #[error("Failed to list '{remote}': {reason}")]
    ListFailed { remote: String, reason: String },

    /// Copy failed
    #[error("Failed to copy from '{remote}' to '{}': {reason}", local.display())]
    CopyFailed {
        remote: String,
        local: PathBuf,
        reason: String,
    },

    /// Could not start rsync
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Local directory creation failed
    #[error("Failed to create local directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type alias for BatchError
pub type Result<T> = std::result::Result<T, BatchError>;

/// Result type alias for TransformError
pub type TransformResult<T> = std::result::Result<T, TransformError>;

/// Result type alias for SyncError
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Terminal outcome of converting a single work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The transform ran and the output is in place
    Converted,

    /// Output already present and not forced
    Skipped,

    /// Every attempt failed
    Failed { reason: String },
}

impl ItemOutcome {
    /// Returns true if the transform actually produced the output
    pub fn is_converted(&self) -> bool {
        matches!(self, ItemOutcome::Converted)
    }

    /// Returns true if this outcome represents a failure
    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }

    /// Short label used in logs and the JSON summary
    pub fn label(&self) -> &'static str {
        match self {
            ItemOutcome::Converted => "converted",
            ItemOutcome::Skipped => "skipped",
            ItemOutcome::Failed { .. } => "failed",
        }
    }
}
