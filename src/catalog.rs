//! Channel catalog
//!
//! The catalog is the complete list of channel identifiers ("tables") a raw
//! file may contain. When no explicit selection is given, every catalog
//! entry is converted. The catalog is a plain value owned by the run
//! configuration so callers can substitute their own.

use crate::error::ConfigError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// SiPM channels of the LEGEND-200 light readout
const LEGEND_SIPMS: [&str; 50] = [
    "S061", "S055", "S017", "S083", "S073", "S071", "S070", "S067", "S068", "S029", "S042",
    "S041", "S023", "S030", "S031", "S002", "S003", "S032", "S036", "S094", "S098", "S008",
    "S058", "S057", "S095", "S099", "S065", "S087", "S082", "S046", "S047", "S011", "S012",
    "S020", "S080", "S026", "S025", "S015", "S043", "S040", "S048", "S049", "S053", "S052",
    "S050", "S051", "S085", "S086", "S037", "S007",
];

/// Ordered, duplicate-free list of channel identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCatalog {
    channels: Vec<String>,
}

impl ChannelCatalog {
    /// Build a catalog from arbitrary identifiers
    ///
    /// Order is preserved; later duplicates are dropped.
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let channels = channels
            .into_iter()
            .map(Into::into)
            .filter(|c| seen.insert(c.clone()))
            .collect();
        Self { channels }
    }

    /// The built-in LEGEND-200 SiPM catalog
    pub fn legend_sipms() -> Self {
        Self::new(LEGEND_SIPMS)
    }

    /// Load a catalog file: one identifier per line, `#` starts a comment
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::InvalidCatalog {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let catalog = Self::parse(&text);
        if catalog.is_empty() {
            return Err(ConfigError::InvalidCatalog {
                path: path.to_path_buf(),
                reason: "no channel identifiers found".into(),
            });
        }
        Ok(catalog)
    }

    fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(|line| line.split('#').next().unwrap_or("").trim())
                .filter(|line| !line.is_empty()),
        )
    }

    /// All channel identifiers in catalog order
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
