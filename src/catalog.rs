//! Game catalog lookup.
//!
//! The catalog maps an identifier to the metadata the cache needs (the
//! expected SHA-256) plus display data used by the front end. It is loaded
//! once at startup from `games.json` and is read-only afterwards.
//!
//! ```json
//! {
//!   "games": {
//!     "doom": {
//!       "identifier": "doom",
//!       "sha256": "ba78…",
//!       "name": { "en": "Doom", "zh-Hans": "毁灭战士" },
//!       "coverFilename": "doom.png"
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::scan::ScanReport;

/// Read-only identifier lookup consumed by the fetch pipeline.
pub trait Catalog: Send + Sync {
    /// Look up an identifier.
    fn get(&self, identifier: &str) -> Option<&CatalogEntry>;

    /// All identifiers, sorted.
    fn identifiers(&self) -> Vec<String>;
}

/// Metadata for one game package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Identifier (filled from the map key when absent in the file)
    #[serde(default)]
    pub identifier: String,

    /// Expected SHA-256 of the archive, lowercase hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Display names keyed by language tag (`en`, `zh-Hans`, `zh-Hant`)
    #[serde(default)]
    pub name: BTreeMap<String, String>,

    /// Cover image filename, if the game has one
    #[serde(
        default,
        rename = "coverFilename",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_filename: Option<String>,
}

impl CatalogEntry {
    /// Create an entry with an optional expected hash.
    #[must_use]
    pub fn new(identifier: impl Into<String>, sha256: Option<&str>) -> Self {
        Self {
            identifier: identifier.into(),
            sha256: sha256.map(str::to_string),
            ..Self::default()
        }
    }

    /// The expected digest, ignoring blank values.
    #[must_use]
    pub fn expected_hash(&self) -> Option<&str> {
        self.sha256
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Display name in `lang`, falling back to the identifier.
    #[must_use]
    pub fn display_name(&self, lang: &str) -> &str {
        self.name
            .get(lang)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(self.identifier.as_str())
    }
}

/// Errors that can occur while loading the catalog.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("cannot read catalog {path}: {source}")]
    Io {
        /// Catalog path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The catalog file is not valid JSON of the expected shape.
    #[error("invalid catalog {path}: {source}")]
    Parse {
        /// Catalog path
        path: PathBuf,
        /// The underlying parse error
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    games: BTreeMap<String, CatalogEntry>,
}

/// The game catalog loaded from `games.json`.
#[derive(Debug, Clone, Default)]
pub struct GameCatalog {
    games: BTreeMap<String, CatalogEntry>,
}

impl GameCatalog {
    /// Build a catalog from entries, keyed by their identifier.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let games = entries
            .into_iter()
            .map(|e| (e.identifier.clone(), e))
            .collect();
        let mut catalog = Self { games };
        catalog.rekey();
        catalog
    }

    /// Parse a catalog document.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self { games: file.games };
        catalog.normalize();
        Ok(catalog)
    }

    /// Load `games.json` and hide everything the scan report lists as missing.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the file cannot be read or parsed.
    pub fn load(path: &Path, report: Option<&ScanReport>) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut catalog = Self::from_json_str(&content).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(report) = report {
            let hidden = catalog.hide_missing(report);
            if hidden > 0 {
                log::info!("Hid {} missing game(s) from the catalog", hidden);
            }
        }
        log::debug!("Loaded {} game(s) from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Key every entry by the NFC form of its identifier, the form
    /// [`crate::cache::ArtifactId`] produces.
    fn rekey(&mut self) {
        let games = std::mem::take(&mut self.games);
        self.games = games
            .into_iter()
            .map(|(key, mut entry)| {
                if entry.identifier.is_empty() {
                    entry.identifier = key;
                }
                entry.identifier = entry.identifier.nfc().collect();
                (entry.identifier.clone(), entry)
            })
            .collect();
    }

    /// Fill identifiers from map keys and a missing `zh-Hant` name from `zh-Hans`.
    fn normalize(&mut self) {
        self.rekey();
        for entry in self.games.values_mut() {
            let hant_blank = entry
                .name
                .get("zh-Hant")
                .map_or(true, |s| s.trim().is_empty());
            if hant_blank {
                let hans = entry.name.get("zh-Hans").cloned().unwrap_or_default();
                entry.name.insert("zh-Hant".to_string(), hans);
            }
        }
    }

    /// Remove identifiers listed as missing or manually flagged. Returns how many were removed.
    pub fn hide_missing(&mut self, report: &ScanReport) -> usize {
        let before = self.games.len();
        self.games.retain(|id, _| !report.is_flagged(id));
        before - self.games.len()
    }

    /// Number of games.
    #[must_use]
    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Iterate entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.games.values()
    }
}

impl Catalog for GameCatalog {
    fn get(&self, identifier: &str) -> Option<&CatalogEntry> {
        self.games.get(identifier).or_else(|| {
            let nfc: String = identifier.nfc().collect();
            self.games.get(&nfc)
        })
    }

    fn identifiers(&self) -> Vec<String> {
        self.games.keys().cloned().collect()
    }
}
