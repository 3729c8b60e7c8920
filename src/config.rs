//! Configuration types for dsp-batch
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Validated runtime configuration for conversion runs and remote syncs

use crate::catalog::ChannelCatalog;
use crate::error::ConfigError;
use crate::mapper::TierMapping;
use crate::sync::SyncTarget;
use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Default size of the conversion pool
pub const DEFAULT_WORKERS: usize = 10;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Batch conversion of raw detector data into processed tiers
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dsp-batch",
    version,
    about = "Idempotent parallel conversion of raw detector files into DSP files",
    long_about = "Discovers raw files under an input tree, maps each one to its location in a \
                  mirrored output tree and runs the DSP transform on every file whose output \
                  is missing (or on all of them with --force).\n\n\
                  The 'sync' subcommand replicates tier/type/period/run subsets from a remote \
                  production area before conversion.",
    after_help = "EXAMPLES:\n    \
        dsp-batch run --rawdir /data/tier/raw --dspdir /data/tier/dsp --config dsp.json\n    \
        dsp-batch run --rawdir raw --dspdir dsp --config dsp.json --sipms S061 S055 -w 4\n    \
        dsp-batch sync --local-prefix /scratch/ --tier raw --type phy --period p15 --run r004 --dry-run"
)]
pub struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert every raw file under an input tree
    Run(RunArgs),

    /// Copy selected files from the remote production area
    Sync(SyncArgs),
}

/// What to do when a conversion fails
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Record the failure and keep converting
    #[default]
    Continue,
    /// Stop dispatching after the first failure
    Abort,
}

/// Summary output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Arguments of `dsp-batch run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Raw directory (where the raw lh5 files are stored)
    #[arg(long, value_name = "DIR")]
    pub rawdir: PathBuf,

    /// DSP directory (mirrors the raw tree)
    #[arg(long, value_name = "DIR")]
    pub dspdir: PathBuf,

    /// DSP config file passed to the transform
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Channels to process (defaults to the whole catalog)
    #[arg(long, value_name = "CHANNEL", num_args = 1..)]
    pub sipms: Option<Vec<String>>,

    /// Channel catalog file, one identifier per line (defaults to the built-in SiPM list)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Re-convert files whose output already exists
    #[arg(long)]
    pub force: bool,

    /// Number of parallel conversions
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKERS, value_name = "NUM")]
    pub workers: usize,

    /// Extension of input files
    #[arg(long = "ext", default_value = "lh5", value_name = "EXT")]
    pub extension: String,

    /// Tier token in input paths
    #[arg(long, default_value = "tier_raw", value_name = "TOKEN")]
    pub from_tier: String,

    /// Tier token substituted in output paths
    #[arg(long, default_value = "tier_dsp", value_name = "TOKEN")]
    pub to_tier: String,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Maximum walk depth below the raw directory (1 = only files directly inside)
    #[arg(short = 'd', long, value_name = "NUM")]
    pub max_depth: Option<usize>,

    /// Behaviour when a conversion fails
    #[arg(long, value_enum, default_value_t = ErrorPolicy::Continue)]
    pub on_error: ErrorPolicy,

    /// Extra attempts for a failed conversion
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub retries: u32,

    /// Transform program
    #[arg(long, env = "DSP_BATCH_TRANSFORM", default_value = "build_dsp", value_name = "PROGRAM")]
    pub transform: String,

    /// Argument placed before the standard transform flags (can be repeated)
    #[arg(long = "transform-arg", value_name = "ARG", allow_hyphen_values = true, action = clap::ArgAction::Append)]
    pub transform_args: Vec<String>,

    /// Summary format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Arguments of `dsp-batch sync`
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Remote host (empty for a locally mounted prefix)
    #[arg(long, default_value = "legend-login1")]
    pub remote_host: String,

    /// Remote path prefix
    #[arg(long, default_value = "/data2/public/prodenv/prod-blind/tmp-auto/generated/")]
    pub remote_prefix: String,

    /// Local path prefix
    #[arg(long, value_name = "DIR")]
    pub local_prefix: PathBuf,

    /// Tier (e.g. dsp), can be repeated
    #[arg(long, required = true, num_args = 1..)]
    pub tier: Vec<String>,

    /// File type (e.g. phy), can be repeated
    #[arg(long = "type", required = true, num_args = 1..)]
    pub data_type: Vec<String>,

    /// Period (e.g. p15), can be repeated
    #[arg(long, required = true, num_args = 1..)]
    pub period: Vec<String>,

    /// Run (e.g. r004), can be repeated
    #[arg(long, required = true, num_args = 1..)]
    pub run: Vec<String>,

    /// Only show what would be copied
    #[arg(long)]
    pub dry_run: bool,

    /// Copy at most this many files in total
    #[arg(long, value_name = "NUM")]
    pub max_files: Option<usize>,

    /// rsync executable
    #[arg(long, env = "DSP_BATCH_RSYNC", default_value = "rsync", value_name = "PROGRAM")]
    pub rsync: String,
}

/// Validated configuration of a conversion run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Input/output roots and tier tokens
    pub mapping: TierMapping,

    /// Config file handed to the transform
    pub config_path: PathBuf,

    /// Convert even when the output exists
    pub force: bool,

    /// Explicit channel selection
    pub selection: Option<Vec<String>>,

    /// Channels used when no selection is given
    pub catalog: ChannelCatalog,

    /// Pool size
    pub worker_count: usize,

    /// Input file extension without the leading dot
    pub extension: String,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Maximum walk depth below the input root
    pub max_depth: Option<usize>,

    /// Failure handling
    pub error_policy: ErrorPolicy,

    /// Extra attempts per failed item
    pub retries: u32,

    /// Transform program and leading arguments
    pub transform_program: String,
    pub transform_args: Vec<String>,

    /// Show progress bar
    pub show_progress: bool,

    /// Summary format
    pub output_format: OutputFormat,
}

impl RunConfig {
    /// Configuration with defaults for everything except the paths
    pub fn new(mapping: TierMapping, config_path: impl Into<PathBuf>) -> Self {
        Self {
            mapping,
            config_path: config_path.into(),
            force: false,
            selection: None,
            catalog: ChannelCatalog::legend_sipms(),
            worker_count: DEFAULT_WORKERS,
            extension: "lh5".to_string(),
            exclude_patterns: Vec::new(),
            max_depth: None,
            error_policy: ErrorPolicy::Continue,
            retries: 0,
            transform_program: "build_dsp".to_string(),
            transform_args: Vec::new(),
            show_progress: false,
            output_format: OutputFormat::Text,
        }
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: RunArgs, quiet: bool) -> Result<Self, ConfigError> {
        if !args.config.is_file() {
            return Err(ConfigError::MissingConfigFile { path: args.config });
        }

        if !args.rawdir.is_dir() {
            return Err(ConfigError::InvalidInputRoot {
                path: args.rawdir,
                reason: "not an existing directory".to_string(),
            });
        }

        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        let extension = args.extension.trim().trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(ConfigError::EmptyExtension);
        }

        if args.from_tier.is_empty() {
            return Err(ConfigError::EmptyTierToken { name: "from-tier" });
        }
        if args.to_tier.is_empty() {
            return Err(ConfigError::EmptyTierToken { name: "to-tier" });
        }

        // Walked paths and mapped outputs must share one spelling of the roots
        let rawdir = absolute_root(&args.rawdir)?;
        let dspdir = absolute_root(&args.dspdir)?;

        // Same tree and same token would convert files onto themselves
        if rawdir == dspdir && args.from_tier == args.to_tier {
            return Err(ConfigError::OutputAliasesInput { path: dspdir });
        }

        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let catalog = match &args.catalog {
            Some(path) => ChannelCatalog::from_file(path)?,
            None => ChannelCatalog::legend_sipms(),
        };

        let selection = match args.sipms {
            Some(channels) if channels.is_empty() => {
                return Err(ConfigError::MissingRequired(
                    "--sipms needs at least one channel".to_string(),
                ))
            }
            other => other,
        };

        if args.transform.trim().is_empty() {
            return Err(ConfigError::MissingRequired("--transform program".to_string()));
        }

        Ok(Self {
            mapping: TierMapping::new(rawdir, dspdir, args.from_tier, args.to_tier),
            config_path: args.config,
            force: args.force,
            selection,
            catalog,
            worker_count: args.workers,
            extension,
            exclude_patterns,
            max_depth: args.max_depth,
            error_policy: args.on_error,
            retries: args.retries,
            transform_program: args.transform,
            transform_args: args.transform_args,
            show_progress: !quiet,
            output_format: args.format,
        })
    }

    pub fn input_root(&self) -> &Path {
        self.mapping.input_root()
    }

    pub fn output_root(&self) -> &Path {
        self.mapping.output_root()
    }

    /// Channels handed to the transform: the selection, or the whole catalog
    pub fn tables(&self) -> &[String] {
        match &self.selection {
            Some(selection) => selection,
            None => self.catalog.channels(),
        }
    }

    /// Selected channels that the catalog does not know about
    pub fn unknown_channels(&self) -> Vec<&str> {
        self.selection
            .iter()
            .flatten()
            .filter(|c| !self.catalog.contains(c))
            .map(String::as_str)
            .collect()
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude_patterns.is_empty() {
            return false;
        }
        let path = path.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&path))
    }

    /// Check if a file has the configured extension
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e == self.extension)
            .unwrap_or(false)
    }
}

fn absolute_root(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| ConfigError::InvalidInputRoot {
        path: path.to_path_buf(),
        reason: format!("cannot make path absolute: {}", e),
    })
}

/// Validated configuration of a remote sync
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub remote_host: String,
    pub remote_prefix: String,
    pub local_prefix: PathBuf,
    pub tiers: Vec<String>,
    pub data_types: Vec<String>,
    pub periods: Vec<String>,
    pub runs: Vec<String>,
    pub dry_run: bool,
    pub max_files: Option<usize>,
    pub rsync_program: String,
    pub show_progress: bool,
}

impl SyncConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: SyncArgs, quiet: bool) -> Result<Self, ConfigError> {
        if args.local_prefix.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("--local-prefix".to_string()));
        }

        for (name, values) in [
            ("--tier", &args.tier),
            ("--type", &args.data_type),
            ("--period", &args.period),
            ("--run", &args.run),
        ] {
            if values.is_empty() || values.iter().any(|v| v.trim().is_empty()) {
                return Err(ConfigError::MissingRequired(format!(
                    "{} needs non-empty values",
                    name
                )));
            }
        }

        Ok(Self {
            remote_host: args.remote_host.trim().to_string(),
            remote_prefix: args.remote_prefix,
            local_prefix: args.local_prefix,
            tiers: args.tier,
            data_types: args.data_type,
            periods: args.period,
            runs: args.run,
            dry_run: args.dry_run,
            max_files: args.max_files,
            rsync_program: args.rsync,
            show_progress: !quiet,
        })
    }

    /// Every tier/type/period/run combination, in argument order
    pub fn targets(&self) -> Vec<SyncTarget> {
        let mut targets = Vec::new();
        for tier in &self.tiers {
            for data_type in &self.data_types {
                for period in &self.periods {
                    for run in &self.runs {
                        targets.push(SyncTarget::new(tier, data_type, period, run));
                    }
                }
            }
        }
        targets
    }
}
