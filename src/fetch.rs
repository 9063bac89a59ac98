//! Fetch-and-install pipeline.
//!
//! [`Fetcher::ensure_cached`] turns an identifier into the path of a verified
//! archive in the cache directory, downloading it from the origin when the
//! cached copy is missing or corrupt:
//!
//! 1. sanitize and look up the identifier,
//! 2. validate an existing file (hash it when the catalog has a digest),
//! 3. stream the body into `<id>.<random>.part` next to the destination,
//! 4. verify the staging file, then rename it over the destination,
//! 5. run LRU eviction, never removing the file just installed.
//!
//! A staging file is a [`tempfile::NamedTempFile`]: any early return drops it
//! and removes it, so a failed or abandoned download leaves nothing behind.
//!
//! # Concurrency
//!
//! The fetcher is `Send + Sync` and shared behind an `Arc`. With
//! `single_flight` on, concurrent misses for the same identifier wait for the
//! first download and then re-check the destination instead of fetching again.
//! Different identifiers never block each other.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

use crate::cache::{
    self, enforce_limit_protecting, ArtifactId, CacheError, CacheStats, EvictionReport, Hasher,
    STAGING_SUFFIX,
};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::origin::Origin;
use crate::progress::{DownloadProgress, NoProgress};

/// Tunables for a [`Fetcher`], resolved once at startup.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Directory holding cached artifacts
    pub cache_dir: PathBuf,
    /// Artifact extension, without the dot
    pub extension: String,
    /// Cache budget in bytes
    pub max_cache_bytes: u64,
    /// Verify digests of cached and downloaded files
    pub verify_hashes: bool,
    /// Coalesce concurrent installs of one identifier
    pub single_flight: bool,
    /// Hasher used for verification
    pub hasher: Hasher,
}

impl FetcherConfig {
    /// Configuration with defaults for everything but the directory.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            extension: "zip".to_string(),
            max_cache_bytes: crate::config::DEFAULT_MAX_CACHE_SIZE,
            verify_hashes: true,
            single_flight: true,
            hasher: Hasher::new(),
        }
    }
}

impl From<&Config> for FetcherConfig {
    fn from(config: &Config) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            extension: config.extension.clone(),
            max_cache_bytes: config.max_cache_size,
            verify_hashes: config.verify_hashes,
            single_flight: config.single_flight,
            hasher: config.hasher(),
        }
    }
}

/// Identifiers currently being installed by this process.
#[derive(Default)]
struct Flights {
    active: Mutex<HashSet<ArtifactId>>,
    done: Condvar,
}

impl Flights {
    fn lock(&self) -> MutexGuard<'_, HashSet<ArtifactId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until no other caller is installing `id`, then claim it.
    ///
    /// Returns the guard and whether this caller had to wait.
    fn enter(&self, id: &ArtifactId) -> (FlightGuard<'_>, bool) {
        let mut active = self.lock();
        let mut waited = false;
        while active.contains(id) {
            waited = true;
            log::debug!("Waiting for in-flight download of {}", id);
            active = self
                .done
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
        active.insert(id.clone());
        (
            FlightGuard {
                flights: self,
                id: id.clone(),
            },
            waited,
        )
    }
}

struct FlightGuard<'a> {
    flights: &'a Flights,
    id: ArtifactId,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flights.lock().remove(&self.id);
        self.flights.done.notify_all();
    }
}

/// The fetch-verify-cache pipeline.
///
/// One `Fetcher` owns one cache directory. It resolves identifiers through a
/// [`Catalog`], downloads from an [`Origin`] and keeps the directory under
/// [`FetcherConfig::max_cache_bytes`].
///
/// # Thread Safety
///
/// `Fetcher` is `Send + Sync`; share it behind an `Arc`. Installs are
/// published with an atomic rename, so a reader of the destination never
/// sees a partial file.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use gamebin::catalog::GameCatalog;
/// use gamebin::fetch::{Fetcher, FetcherConfig};
/// use gamebin::origin::HttpOrigin;
///
/// let catalog = GameCatalog::load("games.json".as_ref(), None)?;
/// let origin = HttpOrigin::new("https://cdn.example.com/games/bin/", None)?;
/// let fetcher = Fetcher::new(
///     FetcherConfig::new("static/games/bin"),
///     Arc::new(catalog),
///     Arc::new(origin),
/// );
///
/// let path = fetcher.serve("doom")?;
/// println!("serving {}", path.display());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Fetcher {
    config: FetcherConfig,
    catalog: Arc<dyn Catalog>,
    origin: Arc<dyn Origin>,
    progress: Arc<dyn DownloadProgress>,
    flights: Flights,
}

impl Fetcher {
    /// Create a fetcher over a catalog and an origin.
    #[must_use]
    pub fn new(config: FetcherConfig, catalog: Arc<dyn Catalog>, origin: Arc<dyn Origin>) -> Self {
        Self {
            config,
            catalog,
            origin,
            progress: Arc::new(NoProgress),
            flights: Flights::default(),
        }
    }

    /// Report download progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn DownloadProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// The fetcher's configuration.
    #[must_use]
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// The catalog this fetcher resolves identifiers against.
    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    /// Canonical cache path of an identifier, if it is a valid one.
    #[must_use]
    pub fn cache_path(&self, identifier: &str) -> Option<PathBuf> {
        ArtifactId::parse(identifier)
            .ok()
            .map(|id| id.cache_path(&self.config.cache_dir, &self.config.extension))
    }

    /// Current cache usage.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats::collect(
            &self.config.cache_dir,
            &self.config.extension,
            self.config.max_cache_bytes,
        )
    }

    /// Evict down to the configured budget.
    pub fn enforce_limit(&self) -> EvictionReport {
        self.evict(None)
    }

    /// Remove every cached artifact.
    pub fn clear(&self) -> EvictionReport {
        cache::clear_cache(&self.config.cache_dir, &self.config.extension)
    }

    fn evict(&self, protect: Option<&Path>) -> EvictionReport {
        enforce_limit_protecting(
            &self.config.cache_dir,
            &self.config.extension,
            self.config.max_cache_bytes,
            protect,
        )
    }

    /// Resolve an identifier to a verified local archive, fetching it if needed.
    ///
    /// # Errors
    ///
    /// * [`CacheError::NotFound`] for invalid or unknown identifiers. No file
    ///   is created and the origin is not contacted.
    /// * [`CacheError::IntegrityMismatch`] if the download does not match the
    ///   catalog digest. Nothing is installed.
    /// * [`CacheError::FetchFailed`] for any download, staging or install failure.
    pub fn ensure_cached(&self, identifier: &str) -> Result<PathBuf, CacheError> {
        let id = ArtifactId::parse(identifier).map_err(|e| {
            log::debug!("Rejecting identifier {:?}: {}", identifier, e);
            CacheError::NotFound(identifier.to_string())
        })?;
        let entry = self
            .catalog
            .get(id.as_str())
            .ok_or_else(|| CacheError::NotFound(id.to_string()))?;
        let expected = entry.expected_hash().map(str::to_string);
        let dest = id.cache_path(&self.config.cache_dir, &self.config.extension);

        if self.is_valid(&id, &dest, expected.as_deref()) {
            log::debug!("Cache hit for {}", id);
            return Ok(dest);
        }

        if !self.config.single_flight {
            return self.install(&id, &dest, expected.as_deref());
        }

        let (_guard, waited) = self.flights.enter(&id);
        if waited && self.is_valid(&id, &dest, expected.as_deref()) {
            log::debug!("{} installed by a concurrent request", id);
            return Ok(dest);
        }
        self.install(&id, &dest, expected.as_deref())
    }

    /// Serve an artifact: ensure it is cached, refresh its access time and
    /// run eviction. This is the call behind the download endpoint.
    ///
    /// # Errors
    ///
    /// Same as [`Fetcher::ensure_cached`].
    pub fn serve(&self, identifier: &str) -> Result<PathBuf, CacheError> {
        let path = self.ensure_cached(identifier)?;
        cache::touch(&path);
        self.evict(Some(&path));
        Ok(path)
    }

    /// Whether `dest` exists and matches the expected digest.
    fn is_valid(&self, id: &ArtifactId, dest: &Path, expected: Option<&str>) -> bool {
        if !dest.is_file() {
            return false;
        }
        let Some(expected) = expected.filter(|_| self.config.verify_hashes) else {
            return true;
        };
        match self.config.hasher.hash_file(dest) {
            Ok(digest) if digest.matches_hex(expected) => true,
            Ok(digest) => {
                log::warn!(
                    "Cached {} is corrupt (expected {}, got {}), re-downloading",
                    id,
                    expected,
                    digest
                );
                false
            }
            Err(e) => {
                log::warn!("Cannot verify cached {}: {}, re-downloading", id, e);
                false
            }
        }
    }

    /// Download, verify and promote one artifact.
    fn install(
        &self,
        id: &ArtifactId,
        dest: &Path,
        expected: Option<&str>,
    ) -> Result<PathBuf, CacheError> {
        let dir = &self.config.cache_dir;
        let failed = |e: std::io::Error| CacheError::fetch_failed(id.as_str(), e);

        fs::create_dir_all(dir).map_err(failed)?;
        let mut staging = tempfile::Builder::new()
            .prefix(&format!("{id}."))
            .suffix(STAGING_SUFFIX)
            .tempfile_in(dir)
            .map_err(failed)?;

        log::info!("Downloading {}", id);
        let written = self.download(id, &mut staging);
        self.progress.on_finish(id.as_str(), written.is_ok());
        let written = written?;

        if let Some(expected) = expected.filter(|_| self.config.verify_hashes) {
            staging.rewind().map_err(failed)?;
            let actual = self
                .config
                .hasher
                .hash_reader(staging.as_file())
                .map_err(failed)?;
            if !actual.matches_hex(expected) {
                log::error!(
                    "Hash mismatch for {}: expected {}, got {}",
                    id,
                    expected,
                    actual
                );
                if let Err(e) = staging.close() {
                    log::warn!("Cannot remove staging file for {}: {}", id, e);
                }
                return Err(CacheError::IntegrityMismatch {
                    identifier: id.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_hex(),
                });
            }
        }

        staging
            .persist(dest)
            .map_err(|e| CacheError::fetch_failed(id.as_str(), e.error))?;
        log::info!("Installed {} ({} bytes)", id, written);

        let report = self.evict(Some(dest));
        if !report.is_noop() {
            log::info!("{}", report.summary());
        }
        Ok(dest.to_path_buf())
    }

    /// Stream the origin body into the staging file. Returns bytes written.
    fn download(&self, id: &ArtifactId, staging: &mut NamedTempFile) -> Result<u64, CacheError> {
        let mut body = self
            .origin
            .open(id, &self.config.extension)
            .map_err(|e| CacheError::fetch_failed(id.as_str(), e))?;
        self.progress.on_start(id.as_str(), body.content_length);

        let failed = |e: std::io::Error| CacheError::fetch_failed(id.as_str(), e);
        let mut buffer = vec![0u8; self.config.hasher.chunk_size()];
        let mut written: u64 = 0;
        loop {
            let n = match body.reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(failed(e)),
            };
            staging.write_all(&buffer[..n]).map_err(failed)?;
            written += n as u64;
            self.progress.on_bytes(n as u64);
        }

        if let Some(expected_len) = body.content_length {
            if written != expected_len {
                return Err(CacheError::fetch_failed(
                    id.as_str(),
                    format!("truncated body: got {written} of {expected_len} bytes"),
                ));
            }
        }

        staging.flush().map_err(failed)?;
        staging.as_file().sync_all().map_err(failed)?;
        Ok(written)
    }
}
