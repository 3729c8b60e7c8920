//! The per-file conversion step
//!
//! The orchestrator does not know how raw data becomes DSP data. It hands a
//! [`TransformRequest`] to a [`Transform`] and treats the call as atomic:
//! either it returns `Ok` and the output file is complete, or it fails.
//!
//! [`CommandTransform`] runs an external program per file. Any
//! `Fn(&TransformRequest) -> TransformResult<()>` is also a transform, which
//! is what the tests use.

pub mod command;

pub use command::CommandTransform;

use crate::error::TransformResult;
use std::path::Path;

/// Write mode requested from the transform: replace whatever is there
pub const WRITE_MODE: &str = "overwrite";

/// Everything the transform needs for one file
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    /// Raw input file
    pub input: &'a Path,

    /// File to write (a temporary sibling of the final output)
    pub output: &'a Path,

    /// Processing configuration file
    pub config: &'a Path,

    /// Channels ("tables") to convert
    pub tables: &'a [String],

    /// Always [`WRITE_MODE`]
    pub write_mode: &'static str,
}

/// A blocking, per-file conversion
pub trait Transform: Send + Sync {
    fn run(&self, request: &TransformRequest<'_>) -> TransformResult<()>;
}

impl<F> Transform for F
where
    F: Fn(&TransformRequest<'_>) -> TransformResult<()> + Send + Sync,
{
    fn run(&self, request: &TransformRequest<'_>) -> TransformResult<()> {
        self(request)
    }
}
