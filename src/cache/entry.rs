//! Artifact identifiers and cache entry records.
//!
//! Identifiers arrive from request URLs and are untrusted. [`ArtifactId`] is
//! the only way to turn one into a cache filename, and it refuses anything
//! that could name a path outside the cache directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

/// Longest identifier accepted, in bytes, leaving room for the extension
/// and staging suffix within a 255-byte filename.
pub const MAX_IDENTIFIER_LEN: usize = 200;

/// Reasons an identifier is refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidIdentifier {
    /// The identifier was empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier exceeds [`MAX_IDENTIFIER_LEN`] bytes.
    #[error("identifier is {0} bytes long (max {MAX_IDENTIFIER_LEN})")]
    TooLong(usize),

    /// The identifier contains a separator or control character.
    #[error("identifier {identifier:?} contains forbidden character {ch:?}")]
    ForbiddenCharacter {
        /// The rejected identifier
        identifier: String,
        /// The offending character
        ch: char,
    },

    /// The identifier starts with a dot (`.`, `..`, hidden names).
    #[error("identifier {0:?} may not start with '.'")]
    LeadingDot(String),
}

/// A sanitized artifact identifier.
///
/// The inner string is NFC-normalized so that visually identical identifiers
/// map to a single cache file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Validate and normalize a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] for empty, oversized, dot-prefixed
    /// identifiers or ones containing `/`, `\`, `:`, NUL or control characters.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        let normalized: String = raw.nfc().collect();
        if normalized.is_empty() {
            return Err(InvalidIdentifier::Empty);
        }
        if normalized.len() > MAX_IDENTIFIER_LEN {
            return Err(InvalidIdentifier::TooLong(normalized.len()));
        }
        if let Some(ch) = normalized
            .chars()
            .find(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
        {
            return Err(InvalidIdentifier::ForbiddenCharacter {
                identifier: normalized,
                ch,
            });
        }
        if normalized.starts_with('.') {
            return Err(InvalidIdentifier::LeadingDot(normalized));
        }
        Ok(Self(normalized))
    }

    /// The normalized identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical cache filename: `<identifier>.<extension>`.
    #[must_use]
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }

    /// Canonical cache path inside `dir`.
    #[must_use]
    pub fn cache_path(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(self.file_name(extension))
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A finalized artifact file found in the cache directory.
///
/// Entries are produced by [`crate::cache::list_entries`] and are a snapshot:
/// the file may be evicted or replaced right after the listing.
///
/// # Ordering
///
/// Eviction sorts entries by `last_access`, oldest first. Entries with equal
/// times keep the listing order, which is not guaranteed to be stable across
/// platforms.
///
/// # Example
///
/// ```
/// use gamebin::cache::CacheEntry;
/// use std::path::PathBuf;
/// use std::time::SystemTime;
///
/// let entry = CacheEntry::new(PathBuf::from("/cache/doom.zip"), 1024, SystemTime::now());
/// assert_eq!(entry.identifier().as_deref(), Some("doom"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Absolute path to the artifact
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last access time (falls back to mtime where atime is unavailable)
    pub last_access: SystemTime,
}

impl CacheEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, last_access: SystemTime) -> Self {
        Self {
            path,
            size,
            last_access,
        }
    }

    /// The identifier portion of the filename (everything before the extension).
    ///
    /// # Returns
    ///
    /// `None` only for a path without a file name, which the inventory never
    /// produces.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    }
}
