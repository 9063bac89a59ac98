//! LRU eviction and bulk removal.
//!
//! # Overview
//!
//! [`enforce_limit`] keeps the cache directory under a byte budget by removing
//! the least recently accessed artifacts first. It takes no lock: every pass
//! re-lists the directory, and a file that is already gone or cannot be
//! removed is skipped. Concurrent passes may both try to delete the same file;
//! the loser simply skips it.
//!
//! The other helpers here remove files in bulk: [`clear_cache`] for the admin
//! "clear cache" action and [`sweep_staging`] for staging files orphaned by a
//! crashed process.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::inventory::{is_artifact_name, is_staging_name, list_entries};

/// Outcome of a removal pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvictionReport {
    /// Files that were removed
    pub removed: Vec<PathBuf>,
    /// Files that could not be removed, with the reason
    pub failures: Vec<(PathBuf, String)>,
    /// Bytes freed by the removed files
    pub bytes_freed: u64,
    /// Cache size after the pass
    pub remaining_bytes: u64,
}

impl EvictionReport {
    /// Number of files removed.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    /// Whether the pass removed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.failures.is_empty()
    }

    /// Human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.failures.is_empty() {
            format!(
                "Removed {} file(s), freed {} bytes",
                self.removed.len(),
                self.bytes_freed
            )
        } else {
            format!(
                "Removed {} file(s), {} failed, freed {} bytes",
                self.removed.len(),
                self.failures.len(),
                self.bytes_freed
            )
        }
    }
}

/// Evict least recently used artifacts until the cache fits in `max_bytes`.
///
/// Never fails. Entries are sorted by last access ascending (ties broken by
/// path so the order is deterministic) and removed until the running total is
/// at or under the budget or nothing is left.
pub fn enforce_limit(dir: &Path, extension: &str, max_bytes: u64) -> EvictionReport {
    enforce_limit_protecting(dir, extension, max_bytes, None)
}

/// Like [`enforce_limit`], but never removes `protect`.
///
/// The pipeline passes the artifact it is about to hand out, so a single
/// archive larger than the whole budget is still served once.
pub fn enforce_limit_protecting(
    dir: &Path,
    extension: &str,
    max_bytes: u64,
    protect: Option<&Path>,
) -> EvictionReport {
    let mut entries = list_entries(dir, extension);
    let mut total: u64 = entries.iter().map(|e| e.size).sum();
    let mut report = EvictionReport {
        remaining_bytes: total,
        ..EvictionReport::default()
    };

    if total <= max_bytes {
        log::trace!(
            "Cache at {} bytes, within budget of {} bytes",
            total,
            max_bytes
        );
        return report;
    }

    log::info!(
        "Cache at {} bytes exceeds budget of {} bytes, evicting",
        total,
        max_bytes
    );

    entries.sort_by(|a, b| {
        a.last_access
            .cmp(&b.last_access)
            .then_with(|| a.path.cmp(&b.path))
    });

    for entry in entries {
        if total <= max_bytes {
            break;
        }
        if protect.is_some_and(|p| p == entry.path) {
            continue;
        }
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                log::debug!("Evicted {} ({} bytes)", entry.path.display(), entry.size);
                total = total.saturating_sub(entry.size);
                report.bytes_freed += entry.size;
                report.removed.push(entry.path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Another pass got there first; its bytes are gone either way.
                total = total.saturating_sub(entry.size);
            }
            Err(e) => {
                log::warn!("Failed to evict {}: {}", entry.path.display(), e);
                report.failures.push((entry.path, e.to_string()));
            }
        }
    }

    report.remaining_bytes = total;
    if total > max_bytes {
        log::warn!(
            "Cache still at {} bytes after eviction (budget {} bytes)",
            total,
            max_bytes
        );
    }
    report
}

/// Remove every finalized artifact from `dir`.
///
/// Staging files are left alone so in-flight downloads are not disturbed.
/// Returns a report of removed files; failures are recorded, not raised.
pub fn clear_cache(dir: &Path, extension: &str) -> EvictionReport {
    let mut report = EvictionReport::default();
    let Ok(read_dir) = fs::read_dir(dir) else {
        return report;
    };

    for dirent in read_dir.flatten() {
        let name = dirent.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_artifact_name(name, extension) {
            continue;
        }
        let path = dirent.path();
        let size = match dirent.metadata() {
            Ok(m) if m.is_file() => m.len(),
            _ => continue,
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                report.bytes_freed += size;
                report.removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!("Failed to remove {}: {}", path.display(), e);
                report.failures.push((path, e.to_string()));
            }
        }
    }

    report.remaining_bytes = super::inventory::total_size(dir, extension);
    log::info!("Cleared cache: {}", report.summary());
    report
}

/// Remove staging files whose last modification is older than `older_than`.
///
/// A staging file that is still being written keeps getting fresh mtimes, so
/// a generous threshold only catches orphans from crashed processes.
pub fn sweep_staging(dir: &Path, older_than: Duration) -> EvictionReport {
    let mut report = EvictionReport::default();
    let Ok(read_dir) = fs::read_dir(dir) else {
        return report;
    };
    let now = SystemTime::now();

    for dirent in read_dir.flatten() {
        let name = dirent.file_name();
        if !name.to_str().is_some_and(is_staging_name) {
            continue;
        }
        let Ok(metadata) = dirent.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < older_than {
            continue;
        }

        let path = dirent.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Removed orphaned staging file {}", path.display());
                report.bytes_freed += metadata.len();
                report.removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!("Failed to remove staging file {}: {}", path.display(), e);
                report.failures.push((path, e.to_string()));
            }
        }
    }
    report
}
