//! On-disk artifact cache.
//!
//! This module owns everything that touches the cache directory:
//!
//! * [`hasher`]: streaming SHA-256 integrity verifier.
//! * [`entry`]: identifier sanitization and cache entry records.
//! * [`inventory`]: directory listing, sizes, and usage statistics.
//! * [`eviction`]: LRU eviction, cache clearing and orphan sweeping.
//! * [`touch`]: access-time refresh feeding the LRU order.
//!
//! # Layout
//!
//! The cache is a flat directory with one `<identifier>.<ext>` file per
//! artifact. Downloads are staged next to their destination as
//! `<identifier>.<random>.part` and renamed into place once verified, so a
//! reader never sees a partial archive at a canonical path.

pub mod entry;
pub mod eviction;
pub mod hasher;
pub mod inventory;
pub mod touch;

use std::io;
use std::path::{Path, PathBuf};

pub use entry::{ArtifactId, CacheEntry, InvalidIdentifier};
pub use eviction::{
    clear_cache, enforce_limit, enforce_limit_protecting, sweep_staging, EvictionReport,
};
pub use hasher::{encode_hex, sha256_hex, Digest, Hasher, DEFAULT_CHUNK_SIZE};
pub use inventory::{list_entries, total_size, CacheStats};
pub use touch::touch;

/// Suffix that marks an in-progress download.
pub const STAGING_SUFFIX: &str = ".part";

/// Boxed cause carried by [`CacheError::FetchFailed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the fetch-and-install pipeline.
///
/// Each variant maps to a distinct class of response at the HTTP boundary;
/// see [`CacheError::status_code`].
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The identifier has no catalog entry (or could never have one).
    #[error("unknown artifact: {0}")]
    NotFound(String),

    /// Download, staging or install failed. Safe to retry.
    #[error("failed to fetch {identifier}: {source}")]
    FetchFailed {
        /// Requested identifier
        identifier: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// The downloaded content does not match the catalog digest.
    #[error("hash mismatch for {identifier}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Requested identifier
        identifier: String,
        /// Digest recorded in the catalog
        expected: String,
        /// Digest of the downloaded bytes
        actual: String,
    },

    /// Local filesystem failure outside a download.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    /// Wrap any error as a [`CacheError::FetchFailed`].
    pub fn fetch_failed(identifier: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::FetchFailed {
            identifier: identifier.into(),
            source: source.into(),
        }
    }

    /// Whether a caller may reasonably retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::IntegrityMismatch { .. })
    }

    /// The HTTP status a web front end should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::FetchFailed { .. } | Self::IntegrityMismatch { .. } => 502,
            Self::Io { .. } => 500,
        }
    }

    /// The identifier involved, where known.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::NotFound(id)
            | Self::FetchFailed { identifier: id, .. }
            | Self::IntegrityMismatch { identifier: id, .. } => Some(id),
            Self::Io { .. } => None,
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while hashing `path`.
    #[must_use]
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}
