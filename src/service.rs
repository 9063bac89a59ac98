//! Application service wiring configuration, catalog, origin and cache.
//!
//! [`GameService`] is built once at startup and owns every long-lived
//! component. Both the CLI and an embedding HTTP layer talk to it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cache::{self, CacheError, CacheStats, EvictionReport};
use crate::catalog::{Catalog, GameCatalog};
use crate::config::Config;
use crate::error::ExitCode;
use crate::fetch::{Fetcher, FetcherConfig};
use crate::origin::{HttpOrigin, Origin};
use crate::progress::DownloadProgress;
use crate::scan::{self, CommandScanner, ProbeScanner, ScanJob, ScanReport, ScanTrigger, Scanner};
use crate::status::{self, ArtifactCheck, StatusListing, StatusQuery};

/// Result of fetching one identifier.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    /// Requested identifier
    pub identifier: String,
    /// Cache path on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Exit classification of this item
    #[serde(skip)]
    pub code: ExitCode,
}

/// Result of a multi-identifier fetch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    /// One outcome per processed identifier, in request order
    pub outcomes: Vec<FetchOutcome>,
    /// Whether Ctrl+C stopped the run early
    pub interrupted: bool,
}

impl FetchSummary {
    /// Number of identifiers that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }

    /// Exit code for the whole run.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.interrupted {
            return ExitCode::Interrupted;
        }
        let failed = self.failed();
        if failed == 0 {
            ExitCode::Success
        } else if failed < self.outcomes.len() {
            ExitCode::PartialSuccess
        } else {
            self.outcomes
                .first()
                .map_or(ExitCode::GeneralError, |o| o.code)
        }
    }
}

/// Result of flagging a game by hand.
#[derive(Debug, Clone, Serialize)]
pub struct MarkOutcome {
    /// Flagged identifier
    pub identifier: String,
    /// `false` if it was already flagged
    pub added: bool,
    /// Report file updated
    pub report_path: PathBuf,
}

/// The composition root.
pub struct GameService {
    config: Config,
    catalog: Arc<GameCatalog>,
    all_games: GameCatalog,
    origin: Arc<dyn Origin>,
    fetcher: Fetcher,
    trigger: Option<ScanTrigger>,
    shutdown: Arc<AtomicBool>,
}

impl GameService {
    /// Load the catalog and scan report named by `config` and connect to the origin.
    ///
    /// # Errors
    ///
    /// Fails if the catalog cannot be loaded or the origin prefix is invalid.
    pub fn open(config: Config) -> Result<Self> {
        let report = ScanReport::load_optional(&config.scan_report_path);
        let all_games = if config.catalog_path.exists() {
            GameCatalog::load(&config.catalog_path, None)
                .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?
        } else {
            // Cache maintenance works without a catalog; every fetch is NotFound.
            log::warn!(
                "Catalog {} not found, starting with an empty catalog",
                config.catalog_path.display()
            );
            GameCatalog::default()
        };
        let origin = HttpOrigin::new(config.origin_prefix.clone(), config.request_timeout())
            .context("configuring origin")?;
        Ok(Self::from_parts(
            config,
            all_games,
            report.as_ref(),
            Arc::new(origin),
        ))
    }

    /// Assemble a service from already loaded parts.
    ///
    /// `all_games` is the unfiltered catalog; games flagged in `report` are
    /// hidden from the fetch pipeline but still listed by [`GameService::status`].
    #[must_use]
    pub fn from_parts(
        config: Config,
        all_games: GameCatalog,
        report: Option<&ScanReport>,
        origin: Arc<dyn Origin>,
    ) -> Self {
        let mut visible = all_games.clone();
        if let Some(report) = report {
            let hidden = visible.hide_missing(report);
            if hidden > 0 {
                log::info!("Hid {} missing game(s) from the catalog", hidden);
            }
        }
        let catalog = Arc::new(visible);
        let fetcher = Fetcher::new(
            FetcherConfig::from(&config),
            catalog.clone(),
            Arc::clone(&origin),
        );
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut service = Self {
            config,
            catalog,
            all_games,
            origin,
            fetcher,
            trigger: None,
            shutdown,
        };
        if service.config.auto_scan {
            let job = service.scan_job(None, Arc::clone(&service.origin));
            service.trigger = Some(ScanTrigger::new(job));
        }
        service
    }

    /// Report download progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn DownloadProgress>) -> Self {
        self.fetcher = self.fetcher.with_progress(progress);
        self
    }

    /// Stop multi-item operations once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        if self.trigger.is_some() {
            let job = self.scan_job(None, Arc::clone(&self.origin));
            self.trigger = Some(ScanTrigger::new(job));
        }
        self
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The catalog served to players (missing games hidden).
    #[must_use]
    pub fn catalog(&self) -> &GameCatalog {
        &self.catalog
    }

    /// The fetch pipeline.
    #[must_use]
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Whether the one-shot background scan has been started.
    #[must_use]
    pub fn scan_started(&self) -> bool {
        self.trigger.as_ref().is_some_and(ScanTrigger::has_fired)
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Serve a download request. Starts the background scan on first use
    /// when `auto_scan` is enabled.
    ///
    /// # Errors
    ///
    /// See [`Fetcher::ensure_cached`].
    pub fn serve(&self, identifier: &str) -> Result<PathBuf, CacheError> {
        if let Some(trigger) = &self.trigger {
            if trigger.trigger_once().is_some() {
                log::info!("Started background scan");
            }
        }
        self.fetcher.serve(identifier)
    }

    /// Fetch several identifiers in order, continuing past failures.
    pub fn fetch_all(&self, identifiers: &[String]) -> FetchSummary {
        let mut summary = FetchSummary::default();
        for identifier in identifiers {
            if self.is_shutdown_requested() {
                log::warn!("Interrupted, skipping remaining downloads");
                summary.interrupted = true;
                break;
            }
            let outcome = match self.fetcher.serve(identifier) {
                Ok(path) => FetchOutcome {
                    identifier: identifier.clone(),
                    path: Some(path),
                    error: None,
                    code: ExitCode::Success,
                },
                Err(e) => {
                    log::warn!("{}", e);
                    FetchOutcome {
                        identifier: identifier.clone(),
                        path: None,
                        error: Some(e.to_string()),
                        code: ExitCode::from_cache_error(&e),
                    }
                }
            };
            summary.outcomes.push(outcome);
        }
        summary
    }

    /// Current cache usage.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.fetcher.stats()
    }

    /// Evict to `max_bytes`, or to the configured budget.
    pub fn evict(&self, max_bytes: Option<u64>) -> EvictionReport {
        match max_bytes {
            Some(max) => cache::enforce_limit(&self.config.cache_dir, &self.config.extension, max),
            None => self.fetcher.enforce_limit(),
        }
    }

    /// Remove every cached archive.
    pub fn clear(&self) -> EvictionReport {
        self.fetcher.clear()
    }

    /// Remove staging files older than `older_than`.
    pub fn sweep(&self, older_than: Duration) -> EvictionReport {
        cache::sweep_staging(&self.config.cache_dir, older_than)
    }

    /// Inspect one cached archive.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] for identifiers outside the catalog.
    pub fn check(&self, identifier: &str) -> Result<ArtifactCheck, CacheError> {
        status::check_artifact(
            &self.all_games,
            identifier,
            &self.config.cache_dir,
            &self.config.extension,
            &self.config.hasher(),
            self.config.verify_hashes,
        )
    }

    /// Status listing over the full catalog, using the current scan report.
    #[must_use]
    pub fn status(&self, query: &StatusQuery) -> StatusListing {
        let report = ScanReport::load_optional(&self.config.scan_report_path);
        status::list_statuses(
            &self.all_games,
            report.as_ref(),
            &self.config.cache_dir,
            &self.config.extension,
            query,
        )
    }

    fn scan_job(&self, threads: Option<usize>, origin: Arc<dyn Origin>) -> ScanJob {
        let scanner: Arc<dyn Scanner> = match &self.config.scanner_command {
            Some(argv) => Arc::new(CommandScanner::new(
                argv.clone(),
                origin.prefix(),
                &self.config.scan_report_path,
            )),
            None => Arc::new(
                ProbeScanner::new(origin, self.config.extension.clone())
                    .with_shutdown_flag(Arc::clone(&self.shutdown)),
            ),
        };
        ScanJob::new(
            scanner,
            self.all_games.identifiers(),
            &self.config.scan_report_path,
            threads.unwrap_or(self.config.scan_threads),
        )
    }

    /// Run a scan in the foreground and save the report.
    ///
    /// # Errors
    ///
    /// Fails if `prefix` is invalid or the scan cannot complete.
    pub fn scan(&self, threads: Option<usize>, prefix: Option<&str>) -> Result<ScanReport> {
        let origin: Arc<dyn Origin> = match prefix {
            Some(p) => Arc::new(
                HttpOrigin::new(p, self.config.request_timeout())
                    .context("configuring scan origin")?,
            ),
            None => Arc::clone(&self.origin),
        };
        let report = self.scan_job(threads, origin).run().context("scan failed")?;
        Ok(report)
    }

    /// Flag a game as missing by hand.
    ///
    /// # Errors
    ///
    /// Fails if the identifier is unknown or the report cannot be written.
    pub fn mark_missing(&self, identifier: &str) -> Result<MarkOutcome> {
        let Some(entry) = self.all_games.get(identifier) else {
            return Err(CacheError::NotFound(identifier.to_string()).into());
        };
        let identifier = entry.identifier.as_str();
        let added = scan::mark_manual(
            &self.config.scan_report_path,
            identifier,
            &self.config.origin_prefix,
        )
        .context("updating scan report")?;
        Ok(MarkOutcome {
            identifier: identifier.to_string(),
            added,
            report_path: self.config.scan_report_path.clone(),
        })
    }
}
