//! Cache inventory: the cache directory is its own index.
//!
//! There is no side database of cached artifacts. Every call lists the
//! directory again, so concurrent installs, evictions and manual deletions are
//! always reflected. Entries that disappear between `read_dir` and `stat` are
//! skipped silently.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use bytesize::ByteSize;
use serde::Serialize;

use super::entry::CacheEntry;
use super::STAGING_SUFFIX;

/// Whether a filename is a finalized artifact with the given extension.
///
/// The extension comparison is ASCII case-insensitive. Staging files never
/// qualify.
#[must_use]
pub fn is_artifact_name(name: &str, extension: &str) -> bool {
    if is_staging_name(name) {
        return false;
    }
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    !stem.is_empty() && ext.eq_ignore_ascii_case(extension)
}

/// Whether a filename is an in-progress download.
#[must_use]
pub fn is_staging_name(name: &str) -> bool {
    name.ends_with(STAGING_SUFFIX)
}

/// List finalized artifacts in `dir`.
///
/// A missing or unreadable directory yields an empty list.
#[must_use]
pub fn list_entries(dir: &Path, extension: &str) -> Vec<CacheEntry> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Cannot list cache directory {}: {}", dir.display(), e);
            }
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for dirent in read_dir {
        let Ok(dirent) = dirent else {
            continue;
        };
        let name = dirent.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_artifact_name(name, extension) {
            continue;
        }

        // Follows symlinks on purpose: an operator may link artifacts in.
        let metadata = match fs::metadata(dirent.path()) {
            Ok(m) => m,
            Err(e) => {
                log::trace!("Skipping vanished cache entry {}: {}", name, e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let last_access = metadata
            .accessed()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push(CacheEntry::new(dirent.path(), metadata.len(), last_access));
    }
    entries
}

/// Sum of the sizes of all finalized artifacts in `dir`.
#[must_use]
pub fn total_size(dir: &Path, extension: &str) -> u64 {
    list_entries(dir, extension).iter().map(|e| e.size).sum()
}

/// Aggregate cache usage, as shown on the about and admin pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cached artifacts
    pub count: usize,
    /// Bytes used by cached artifacts
    pub total_bytes: u64,
    /// Configured budget in bytes
    pub max_bytes: u64,
}

impl CacheStats {
    /// Collect statistics for `dir` against a budget.
    #[must_use]
    pub fn collect(dir: &Path, extension: &str, max_bytes: u64) -> Self {
        let entries = list_entries(dir, extension);
        Self {
            count: entries.len(),
            total_bytes: entries.iter().map(|e| e.size).sum(),
            max_bytes,
        }
    }

    /// Human-readable usage (IEC units).
    #[must_use]
    pub fn total_human(&self) -> String {
        ByteSize::b(self.total_bytes).to_string()
    }

    /// Human-readable budget (IEC units).
    #[must_use]
    pub fn max_human(&self) -> String {
        ByteSize::b(self.max_bytes).to_string()
    }

    /// Whether usage exceeds the budget.
    #[must_use]
    pub fn over_budget(&self) -> bool {
        self.total_bytes > self.max_bytes
    }
}
