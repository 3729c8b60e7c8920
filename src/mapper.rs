//! Input-to-output path mapping
//!
//! An output location is derived from its input by swapping the input root
//! for the output root and replacing the tier token (`tier_raw` -> `tier_dsp`
//! by default) in every remaining path component. Nothing here touches the
//! filesystem.

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

/// Maps files of one data tier onto the mirrored tree of another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierMapping {
    input_root: PathBuf,
    output_root: PathBuf,
    input_token: String,
    output_token: String,
}

impl TierMapping {
    /// Create a mapping between two roots and two tier tokens
    pub fn new(
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        input_token: impl Into<String>,
        output_token: impl Into<String>,
    ) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            input_token: input_token.into(),
            output_token: output_token.into(),
        }
    }

    /// Root directory searched for inputs
    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    /// Root directory receiving outputs
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Token identifying the input tier
    pub fn input_token(&self) -> &str {
        &self.input_token
    }

    /// Token identifying the output tier
    pub fn output_token(&self) -> &str {
        &self.output_token
    }

    /// Compute the output path for `input`
    ///
    /// Inputs outside the input root keep their location and only get the
    /// token substitution.
    pub fn map(&self, input: &Path) -> PathBuf {
        match input.strip_prefix(&self.input_root) {
            Ok(relative) => {
                let mut output = self.output_root.clone();
                for component in relative.components() {
                    output.push(self.map_component(component));
                }
                output
            }
            Err(_) => input
                .components()
                .map(|component| self.map_component(component))
                .collect(),
        }
    }

    fn map_component(&self, component: Component<'_>) -> OsString {
        match component {
            Component::Normal(part) => self.substitute(part),
            other => other.as_os_str().to_os_string(),
        }
    }

    fn substitute(&self, part: &OsStr) -> OsString {
        if self.input_token.is_empty() {
            return part.to_os_string();
        }

        // Non-UTF-8 names cannot contain the token in a meaningful way
        match part.to_str() {
            Some(s) => OsString::from(s.replace(&self.input_token, &self.output_token)),
            None => part.to_os_string(),
        }
    }
}
