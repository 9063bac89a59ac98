//! Catalog status listing and single-archive checks for the admin views.
//!
//! A game's status is derived from the scan report and the cache directory:
//!
//! | condition                                  | status       |
//! |--------------------------------------------|--------------|
//! | flagged in the scan report                 | `missing`    |
//! | cached, every ZIP member passes its CRC    | `ok`         |
//! | cached, archive unreadable or CRC failure  | `error`      |
//! | not cached                                 | `not_fetched`|
//!
//! Games that were never fetched are counted as playable: they download on
//! demand, so the `ok` group includes them.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;

use crate::cache::{ArtifactId, CacheError, Hasher};
use crate::catalog::{Catalog, GameCatalog};
use crate::scan::ScanReport;

/// Language used for display names in listings.
pub const DISPLAY_LANGUAGE: &str = "zh-Hant";

/// Cache status of one catalog game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// The origin does not have the archive
    Missing,
    /// Never downloaded; fetched on first request
    NotFetched,
    /// Cached and intact
    Ok,
    /// Cached but broken
    Error,
}

impl ArtifactStatus {
    /// Whether a player can expect the game to load.
    #[must_use]
    pub fn is_playable(self) -> bool {
        matches!(self, Self::Ok | Self::NotFetched)
    }

    /// Short label used in text output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::NotFetched => "not fetched",
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Group filter for [`list_statuses`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StatusGroup {
    /// Every game
    #[default]
    All,
    /// Playable games (intact or not yet fetched)
    Ok,
    /// Games whose cached archive is broken
    Error,
    /// Games flagged as missing
    Missing,
}

impl StatusGroup {
    fn admits(self, status: ArtifactStatus) -> bool {
        match self {
            Self::All => true,
            Self::Ok => status.is_playable(),
            Self::Error => status == ArtifactStatus::Error,
            Self::Missing => status == ArtifactStatus::Missing,
        }
    }
}

/// Filters for a status listing.
#[derive(Debug, Clone, Default)]
pub struct StatusQuery {
    /// Substring matched against identifier and display name
    pub keyword: Option<String>,
    /// Group filter
    pub group: StatusGroup,
    /// Maximum number of items returned; `None` or 0 for all
    pub limit: Option<usize>,
}

/// One row of a status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusItem {
    /// Game identifier
    pub identifier: String,
    /// Display name
    pub name: String,
    /// Derived status
    pub status: ArtifactStatus,
}

/// Result of [`list_statuses`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusListing {
    /// Games matching the keyword
    pub total_all: usize,
    /// Of those, how many are playable
    pub total_ok: usize,
    /// Of those, how many are broken
    pub total_error: usize,
    /// Of those, how many are missing
    pub total_missing: usize,
    /// Items after the group filter and limit
    pub items: Vec<StatusItem>,
}

/// Whether a ZIP archive opens and every member passes its CRC check.
#[must_use]
pub fn archive_ok(path: &Path) -> bool {
    match test_archive(path) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("Archive {} failed integrity test: {}", path.display(), e);
            false
        }
    }
}

fn test_archive(path: &Path) -> zip::result::ZipResult<()> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        if member.is_dir() {
            continue;
        }
        // The CRC is compared once the reader hits EOF.
        io::copy(&mut member, &mut io::sink())?;
    }
    Ok(())
}

/// Status of one identifier.
#[must_use]
pub fn artifact_status(
    identifier: &str,
    cache_dir: &Path,
    extension: &str,
    report: Option<&ScanReport>,
) -> ArtifactStatus {
    if report.is_some_and(|r| r.is_flagged(identifier)) {
        return ArtifactStatus::Missing;
    }
    let Ok(id) = ArtifactId::parse(identifier) else {
        return ArtifactStatus::Error;
    };
    let path = id.cache_path(cache_dir, extension);
    if !path.is_file() {
        ArtifactStatus::NotFetched
    } else if archive_ok(&path) {
        ArtifactStatus::Ok
    } else {
        ArtifactStatus::Error
    }
}

/// Build the status listing for every game in `catalog`.
///
/// `catalog` should be the unfiltered catalog so missing games show up.
/// Counters reflect the keyword filter but not the group filter or limit.
#[must_use]
pub fn list_statuses(
    catalog: &GameCatalog,
    report: Option<&ScanReport>,
    cache_dir: &Path,
    extension: &str,
    query: &StatusQuery,
) -> StatusListing {
    let keyword = query
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let mut listing = StatusListing::default();
    for entry in catalog.iter() {
        let name = entry.display_name(DISPLAY_LANGUAGE);
        if let Some(k) = keyword {
            if !entry.identifier.contains(k) && !name.contains(k) {
                continue;
            }
        }
        let status = artifact_status(&entry.identifier, cache_dir, extension, report);

        listing.total_all += 1;
        match status {
            ArtifactStatus::Ok | ArtifactStatus::NotFetched => listing.total_ok += 1,
            ArtifactStatus::Error => listing.total_error += 1,
            ArtifactStatus::Missing => listing.total_missing += 1,
        }
        if query.group.admits(status) {
            listing.items.push(StatusItem {
                identifier: entry.identifier.clone(),
                name: name.to_string(),
                status,
            });
        }
    }

    if let Some(limit) = query.limit.filter(|&l| l > 0) {
        listing.items.truncate(limit);
    }
    listing
}

/// Detailed integrity report for one cached archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactCheck {
    /// Game identifier
    pub identifier: String,
    /// Cache path checked
    pub path: PathBuf,
    /// Whether the archive is cached
    pub exists: bool,
    /// Size in bytes (0 when absent)
    pub size: u64,
    /// Digest recorded in the catalog
    pub expected_sha256: Option<String>,
    /// Digest of the cached file
    pub actual_sha256: Option<String>,
    /// `None` when either digest is unknown
    pub sha_match: Option<bool>,
    /// `None` when the archive is not cached
    pub zip_ok: Option<bool>,
    /// Whether hash verification is turned off
    pub verification_disabled: bool,
}

/// Inspect the cached archive for `identifier` without fetching anything.
///
/// # Errors
///
/// Returns [`CacheError::NotFound`] if the identifier is not in the catalog,
/// and [`CacheError::Io`] if the cached file exists but cannot be read.
pub fn check_artifact(
    catalog: &dyn Catalog,
    identifier: &str,
    cache_dir: &Path,
    extension: &str,
    hasher: &Hasher,
    verify_hashes: bool,
) -> Result<ArtifactCheck, CacheError> {
    let not_found = || CacheError::NotFound(identifier.to_string());
    let id = ArtifactId::parse(identifier).map_err(|_| not_found())?;
    let entry = catalog.get(id.as_str()).ok_or_else(not_found)?;
    let expected = entry.expected_hash().map(str::to_string);

    let path = id.cache_path(cache_dir, extension);
    let metadata = match std::fs::metadata(&path) {
        Ok(m) => Some(m).filter(|m| m.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(source) => return Err(CacheError::Io { path, source }),
    };
    let exists = metadata.is_some();
    let size = metadata.map_or(0, |m| m.len());

    let actual = if exists {
        let digest = hasher.hash_file(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: io::Error::other(e),
        })?;
        Some(digest.to_hex())
    } else {
        None
    };
    let sha_match = match (&expected, &actual) {
        (Some(e), Some(a)) => Some(a.eq_ignore_ascii_case(e.trim())),
        _ => None,
    };
    let zip_ok = exists.then(|| archive_ok(&path));

    Ok(ArtifactCheck {
        identifier: id.to_string(),
        path,
        exists,
        size,
        expected_sha256: expected,
        actual_sha256: actual,
        sha_match,
        zip_ok,
        verification_disabled: !verify_hashes,
    })
}
