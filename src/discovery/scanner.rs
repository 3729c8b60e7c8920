//! Input scanner
//!
//! Walks the input tree, keeps files with the configured extension, maps
//! each one to its output location and creates the output directories so
//! that they exist before any conversion is dispatched.

use crate::config::RunConfig;
use crate::error::DiscoveryError;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One conversion task
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkItem {
    /// Raw input file
    pub input: PathBuf,

    /// Where the converted file goes
    pub output: PathBuf,
}

impl WorkItem {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Statistics from the discovery phase
#[derive(Debug, Clone, Default)]
pub struct DiscoveryStats {
    /// Files matching the extension filter
    pub files_matched: u64,

    /// Paths skipped by exclude patterns
    pub excluded: u64,

    /// Output directories that had to be created
    pub dirs_created: u64,

    /// Entries that could not be read while walking
    pub walk_errors: u64,

    /// Inputs whose mapped output is the input itself
    pub self_mapped: u64,

    /// Inputs dropped because an earlier input maps to the same output
    pub output_collisions: u64,

    /// Time spent walking and preparing directories
    pub duration: Duration,
}

/// Result of a discovery pass
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Work items sorted by input path, one per input
    pub items: Vec<WorkItem>,

    pub stats: DiscoveryStats,
}

/// Builds the work list for a conversion run
pub struct DiscoveryScanner<'a> {
    config: &'a RunConfig,
}

impl<'a> DiscoveryScanner<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Walk the input tree, map every match and create output directories
    pub fn scan(&self) -> Result<Discovery, DiscoveryError> {
        let start = Instant::now();
        let mut stats = DiscoveryStats::default();

        info!(
            root = %self.config.input_root().display(),
            extension = %self.config.extension,
            "Discovering input files"
        );

        let inputs = self.find_inputs(&mut stats)?;
        stats.files_matched = inputs.len() as u64;

        let items = self.map_inputs(inputs, &mut stats);

        stats.dirs_created = prepare_output_dirs(&items)?;
        stats.duration = start.elapsed();

        info!(
            files = stats.files_matched,
            dirs_created = stats.dirs_created,
            excluded = stats.excluded,
            self_mapped = stats.self_mapped,
            collisions = stats.output_collisions,
            errors = stats.walk_errors,
            ms = stats.duration.as_millis() as u64,
            "Discovery complete"
        );

        Ok(Discovery { items, stats })
    }

    /// Pair every input with its output, dropping pairs that cannot be converted safely
    fn map_inputs(&self, inputs: BTreeSet<PathBuf>, stats: &mut DiscoveryStats) -> Vec<WorkItem> {
        let mut owners: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut items = Vec::with_capacity(inputs.len());

        for input in inputs {
            let output = self.config.mapping.map(&input);

            // Typically an earlier output found again in a shared tree
            if output == input {
                stats.self_mapped += 1;
                warn!(path = %input.display(), "Input maps onto itself, skipping");
                continue;
            }

            // Two workers would otherwise share one partial file
            if let Some(first) = owners.get(&output) {
                stats.output_collisions += 1;
                warn!(
                    input = %input.display(),
                    kept = %first.display(),
                    output = %output.display(),
                    "Output already claimed by another input, skipping"
                );
                continue;
            }

            owners.insert(output.clone(), input.clone());
            items.push(WorkItem { input, output });
        }

        items
    }

    /// Recursively collect matching files, deduplicated and sorted
    pub fn find_inputs(&self, stats: &mut DiscoveryStats) -> Result<BTreeSet<PathBuf>, DiscoveryError> {
        let root = self.config.input_root();

        // An output tree nested inside the input tree must not be rescanned.
        // Compared canonically so `.`/`..` or symlinked spellings still match.
        let output_root = fs::canonicalize(self.config.output_root())
            .ok()
            .filter(|out| fs::canonicalize(root).is_ok_and(|r| *out != r));

        let mut walker = WalkDir::new(root).follow_links(true);
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut excluded = 0u64;
        let mut inputs = BTreeSet::new();

        let entries = walker.into_iter().filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let path = entry.path();
            if is_output_root(entry, output_root.as_deref()) || self.config.is_excluded(path) {
                excluded += 1;
                return false;
            }
            true
        });

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(DiscoveryError::RootUnreadable {
                        path: root.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    stats.walk_errors += 1;
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if entry.file_type().is_file() && self.config.matches_extension(entry.path()) {
                inputs.insert(entry.into_path());
            }
        }

        stats.excluded = excluded;
        Ok(inputs)
    }
}

fn is_output_root(entry: &walkdir::DirEntry, output_root: Option<&Path>) -> bool {
    match output_root {
        Some(out) if entry.file_type().is_dir() => {
            fs::canonicalize(entry.path()).is_ok_and(|dir| dir == out)
        }
        _ => false,
    }
}

/// Create the parent directory of every output, returning how many were new
fn prepare_output_dirs(items: &[WorkItem]) -> Result<u64, DiscoveryError> {
    let parents: BTreeSet<&Path> = items.iter().filter_map(|item| item.output.parent()).collect();

    let mut created = 0u64;
    for dir in parents {
        if dir.as_os_str().is_empty() || dir.is_dir() {
            continue;
        }
        match fs::create_dir_all(dir) {
            Ok(()) => {
                created += 1;
                debug!(dir = %dir.display(), "Created output directory");
            }
            // Another process may have raced us to it
            Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(source) => {
                return Err(DiscoveryError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        }
    }

    Ok(created)
}
