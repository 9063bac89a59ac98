//! Application configuration management.
//!
//! Settings are layered with figment, later sources overriding earlier ones:
//!
//! 1. built-in defaults ([`Config::default`]),
//! 2. a TOML file (`--config PATH`, or `config.toml` in the platform config dir),
//! 3. environment variables prefixed with `GAMEBIN_` (e.g. `GAMEBIN_MAX_CACHE_SIZE`),
//! 4. command-line flags ([`Config::merge_cli`]).
//!
//! The resolved [`Config`] is read-only for the rest of the process.
//!
//! # Example file
//!
//! ```toml
//! cache_dir = "/var/cache/gamebin"
//! origin_prefix = "https://dos-bin.zczc.cz/"
//! max_cache_size = 10737418240
//! verify_hashes = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cache::{Hasher, DEFAULT_CHUNK_SIZE};
use crate::cli::Cli;

/// Default cache budget: 5 GiB.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default origin serving the archives.
pub const DEFAULT_ORIGIN_PREFIX: &str = "https://dos-bin.zczc.cz/";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GAMEBIN_";

/// Errors that can occur while resolving configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A source could not be read or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding cached archives
    pub cache_dir: PathBuf,
    /// Base URL archives are fetched from
    pub origin_prefix: String,
    /// Archive extension, without the dot
    pub extension: String,
    /// Cache budget in bytes
    pub max_cache_size: u64,
    /// Read size used when hashing
    pub hash_chunk_size: usize,
    /// Verify archives against catalog digests
    pub verify_hashes: bool,
    /// Coalesce concurrent downloads of one identifier
    pub single_flight: bool,
    /// Whole-request timeout for downloads; 0 disables it
    pub request_timeout_secs: u64,
    /// Catalog file (`games.json`)
    pub catalog_path: PathBuf,
    /// Scan report file (`missing.json`)
    pub scan_report_path: PathBuf,
    /// Concurrent probes during a scan
    pub scan_threads: usize,
    /// External scanner argv; the built-in prober is used when unset
    pub scanner_command: Option<Vec<String>>,
    /// Start a background scan on the first served request
    pub auto_scan: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("cz", "zczc", "gamebin")
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf());
        Self {
            cache_dir: data_dir.join("cache"),
            origin_prefix: DEFAULT_ORIGIN_PREFIX.to_string(),
            extension: "zip".to_string(),
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            hash_chunk_size: DEFAULT_CHUNK_SIZE,
            verify_hashes: true,
            single_flight: true,
            request_timeout_secs: 300,
            catalog_path: data_dir.join("games.json"),
            scan_report_path: data_dir.join("missing.json"),
            scan_threads: 20,
            scanner_command: None,
            auto_scan: false,
        }
    }
}

impl Config {
    /// Default platform-specific configuration file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("cz", "zczc", "gamebin").map(|d| d.config_dir().join("config.toml"))
    }

    /// The layered figment for `config_file` (or the default path), without CLI flags.
    #[must_use]
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = config_file
            .map(Path::to_path_buf)
            .or_else(Self::default_config_path);
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Resolve and validate configuration from defaults, file and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a source is malformed or a value is invalid.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(config_file).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the resolved values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the merged result is invalid.
    pub fn merge_cli(mut self, cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(dir) = &cli.cache_dir {
            self.cache_dir.clone_from(dir);
        }
        if let Some(origin) = &cli.origin {
            self.origin_prefix.clone_from(origin);
        }
        if let Some(max) = cli.max_cache_size {
            self.max_cache_size = max;
        }
        if let Some(catalog) = &cli.catalog {
            self.catalog_path.clone_from(catalog);
        }
        if cli.no_verify {
            self.verify_hashes = false;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origin_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "origin_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self.extension.is_empty() || self.extension.contains(['.', '/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "extension",
                reason: format!("{:?} is not a bare file extension", self.extension),
            });
        }
        if self.hash_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "hash_chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.scan_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "scan_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        if self
            .scanner_command
            .as_ref()
            .is_some_and(|argv| argv.is_empty())
        {
            return Err(ConfigError::Invalid {
                field: "scanner_command",
                reason: "must name a program".to_string(),
            });
        }
        Ok(())
    }

    /// The hasher configured for verification.
    #[must_use]
    pub fn hasher(&self) -> Hasher {
        Hasher::with_chunk_size(self.hash_chunk_size)
    }

    /// Download timeout, `None` when disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
