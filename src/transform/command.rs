//! Transform backed by an external program
//!
//! Each conversion runs as its own OS process:
//!
//! ```text
//! <program> [args...] --input IN --output OUT --config CFG --tables A,B,... --write-mode overwrite
//! ```

use super::{Transform, TransformRequest};
use crate::config::RunConfig;
use crate::error::{TransformError, TransformResult};
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Maximum number of stderr lines kept in an error
const STDERR_TAIL_LINES: usize = 20;

/// Runs one external process per file
#[derive(Debug, Clone)]
pub struct CommandTransform {
    program: String,
    args: Vec<String>,
}

impl CommandTransform {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments inserted before the standard flags
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.transform_program.clone()).with_args(config.transform_args.iter().cloned())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the command line for one request
    pub fn command(&self, request: &TransformRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--input")
            .arg(request.input)
            .arg("--output")
            .arg(request.output)
            .arg("--config")
            .arg(request.config)
            .arg("--tables")
            .arg(request.tables.join(","))
            .arg("--write-mode")
            .arg(request.write_mode);
        cmd
    }
}

impl Transform for CommandTransform {
    fn run(&self, request: &TransformRequest<'_>) -> TransformResult<()> {
        debug!(
            program = %self.program,
            input = %request.input.display(),
            output = %request.output.display(),
            config = %request.config.display(),
            "Calling transform"
        );

        let output = self
            .command(request)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| TransformError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.stdout.is_empty() {
            trace!(stdout = %String::from_utf8_lossy(&output.stdout), "Transform output");
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(TransformError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            })
        }
    }
}

/// Last lines of a process' stderr, joined on one line
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}
