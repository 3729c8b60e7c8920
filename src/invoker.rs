//! Single-item conversion with idempotency check
//!
//! An item is skipped when its output exists and the run is not forced.
//! Otherwise the transform writes to a hidden `.<name>.partial` sibling
//! which is renamed over the final output only after the transform
//! succeeded, so an output that exists is always complete.

use crate::config::RunConfig;
use crate::discovery::WorkItem;
use crate::error::{ItemOutcome, TransformError, TransformResult};
use crate::transform::{Transform, TransformRequest, WRITE_MODE};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one item plus the number of transform calls it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResult {
    pub outcome: ItemOutcome,
    pub attempts: u32,
}

/// Runs the transform for one work item at a time
pub struct ConversionInvoker {
    config: Arc<RunConfig>,
    transform: Arc<dyn Transform>,
}

impl ConversionInvoker {
    pub fn new(config: Arc<RunConfig>, transform: Arc<dyn Transform>) -> Self {
        Self { config, transform }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Whether the item has to be converted at all
    pub fn needs_conversion(&self, item: &WorkItem) -> bool {
        self.config.force || !item.output.exists()
    }

    /// Convert one item, retrying up to the configured number of times
    pub fn invoke(&self, item: &WorkItem) -> InvokeResult {
        if !self.needs_conversion(item) {
            debug!(output = %item.output.display(), "Output exists, skipping");
            return InvokeResult {
                outcome: ItemOutcome::Skipped,
                attempts: 0,
            };
        }

        let max_attempts = self.config.retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.convert_once(item) {
                Ok(()) => {
                    return InvokeResult {
                        outcome: ItemOutcome::Converted,
                        attempts: attempt,
                    }
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        input = %item.input.display(),
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Conversion failed, retrying"
                    );
                }
                Err(e) => {
                    return InvokeResult {
                        outcome: ItemOutcome::Failed {
                            reason: e.to_string(),
                        },
                        attempts: attempt,
                    }
                }
            }
        }
    }

    /// One transform call with write-to-temp-then-rename
    pub fn convert_once(&self, item: &WorkItem) -> TransformResult<()> {
        let partial = partial_path(&item.output);

        debug!(
            input = %item.input.display(),
            output = %item.output.display(),
            config = %self.config.config_path.display(),
            "Converting"
        );

        // Leftover of an interrupted earlier run
        remove_if_present(&partial);

        let request = TransformRequest {
            input: &item.input,
            output: &partial,
            config: &self.config.config_path,
            tables: self.config.tables(),
            write_mode: WRITE_MODE,
        };

        let result = self
            .transform
            .run(&request)
            .and_then(|()| finalize(&partial, &item.output));

        if result.is_err() {
            remove_if_present(&partial);
        }
        result
    }
}

/// Hidden sibling the transform writes into
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = output.file_name() {
        name.push(file_name);
    }
    name.push(".partial");
    output.with_file_name(name)
}

fn finalize(partial: &Path, output: &Path) -> TransformResult<()> {
    if !partial.is_file() {
        return Err(TransformError::MissingOutput {
            path: partial.to_path_buf(),
        });
    }
    fs::rename(partial, output).map_err(|source| TransformError::Finalize {
        path: output.to_path_buf(),
        source,
    })
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}
