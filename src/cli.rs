//! Command-line interface definitions for gamebin.
//!
//! Global options (verbosity, config file, overrides) apply to every
//! subcommand. Each subcommand maps onto one cache or catalog operation.
//!
//! # Example
//!
//! ```bash
//! # Fetch two games into the cache
//! gamebin fetch doom pal
//!
//! # Show cache usage as JSON
//! gamebin --output json stats
//!
//! # Shrink the cache to 1 GiB
//! gamebin evict --max-size 1GiB
//!
//! # List games whose archives are broken
//! gamebin status --group error
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::status::StatusGroup;

/// On-demand fetch, verify and LRU cache for retro game archives.
///
/// gamebin downloads game packages from a static origin the first time they
/// are requested, checks them against the catalog's SHA-256 digests and keeps
/// them in a size-bounded local cache.
#[derive(Debug, Parser)]
#[command(name = "gamebin")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Output format for command results
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Override the cache directory
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Override the origin prefix (base URL)
    #[arg(long, value_name = "URL", global = true)]
    pub origin: Option<String>,

    /// Override the catalog file
    #[arg(long, value_name = "PATH", global = true)]
    pub catalog: Option<PathBuf>,

    /// Override the cache budget (e.g., 500MB, 5GiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size, global = true)]
    pub max_cache_size: Option<u64>,

    /// Skip SHA-256 verification of cached and downloaded archives
    #[arg(long, global = true)]
    pub no_verify: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download and verify games into the cache
    Fetch(FetchArgs),
    /// Show cache usage
    Stats,
    /// Evict least recently used archives until under budget
    Evict(EvictArgs),
    /// Remove every cached archive
    Clear,
    /// Verify one cached archive (digest and ZIP integrity)
    Check(CheckArgs),
    /// List catalog games with their cache status
    Status(StatusArgs),
    /// Probe the origin for missing games and write the scan report
    Scan(ScanArgs),
    /// Flag a game as missing by hand
    MarkMissing(MarkMissingArgs),
    /// Remove staging files left behind by interrupted downloads
    Sweep(SweepArgs),
}

/// Arguments for the fetch subcommand.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Game identifiers to fetch
    #[arg(value_name = "ID", required = true)]
    pub identifiers: Vec<String>,
}

/// Arguments for the evict subcommand.
#[derive(Debug, Args)]
pub struct EvictArgs {
    /// Budget for this pass (default: configured max_cache_size)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,
}

/// Arguments for the check subcommand.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Game identifier to check
    #[arg(value_name = "ID")]
    pub identifier: String,
}

/// Arguments for the status subcommand.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only show games in this group
    #[arg(long, value_enum, default_value = "all")]
    pub group: StatusGroup,

    /// Keyword matched against identifiers and display names
    #[arg(long, value_name = "TEXT")]
    pub query: Option<String>,

    /// Show at most this many games
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Concurrent probes (default: configured scan_threads)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Origin prefix to scan (default: configured origin_prefix)
    #[arg(long, value_name = "URL")]
    pub prefix: Option<String>,
}

/// Arguments for the mark-missing subcommand.
#[derive(Debug, Args)]
pub struct MarkMissingArgs {
    /// Game identifier to flag
    #[arg(value_name = "ID")]
    pub identifier: String,
}

/// Arguments for the sweep subcommand.
#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Only remove staging files older than this many seconds
    #[arg(long, value_name = "SECS", default_value = "3600")]
    pub older_than_secs: u64,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use gamebin::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("5GiB").unwrap(), 5 * 1_073_741_824);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    if num < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
