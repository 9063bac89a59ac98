//! Missing-game scanning.
//!
//! A scan checks which catalog identifiers the origin actually has and writes
//! a [`ScanReport`] (`missing.json`). The catalog loader hides everything the
//! report flags; operators can also flag games by hand ([`mark_manual`]).
//!
//! Scans are run through the [`Scanner`] trait:
//!
//! * [`ProbeScanner`] sends a HEAD request per identifier on a bounded rayon pool.
//! * [`CommandScanner`] runs an external program that writes the report itself.
//!
//! [`ScanTrigger`] starts one background scan per process, the first time a
//! request comes in.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::ArtifactId;
use crate::origin::Origin;

/// Errors that can occur while scanning or persisting a report.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Reading or writing the report failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Report path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The report is not valid JSON.
    #[error("invalid scan report {path}: {source}")]
    Parse {
        /// Report path
        path: PathBuf,
        /// The underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// The probe thread pool could not be created.
    #[error("cannot start scan workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// The external scanner could not be started or exited with failure.
    #[error("scanner command {command:?} failed: {reason}")]
    Command {
        /// Program and arguments
        command: Vec<String>,
        /// Failure description
        reason: String,
    },

    /// The scan was interrupted before finishing.
    #[error("scan interrupted")]
    Interrupted,
}

/// Result of a missing-game scan, persisted as `missing.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanReport {
    /// Origin prefix that was scanned
    pub prefix: String,
    /// Number of identifiers checked
    pub scanned: usize,
    /// Number of identifiers the origin lacks
    pub missing_count: usize,
    /// Identifiers the origin lacks
    pub missing: Vec<String>,
    /// Identifiers flagged by an operator
    pub manual: Vec<String>,
    /// When the scan finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl ScanReport {
    /// Whether an identifier is flagged as missing, automatically or by hand.
    #[must_use]
    pub fn is_flagged(&self, identifier: &str) -> bool {
        self.missing.iter().any(|m| m == identifier) || self.manual.iter().any(|m| m == identifier)
    }

    /// Read a report.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let content = fs::read_to_string(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ScanError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a report if one exists and is readable; otherwise `None`.
    #[must_use]
    pub fn load_optional(path: &Path) -> Option<Self> {
        if !path.is_file() {
            return None;
        }
        match Self::load(path) {
            Ok(report) => Some(report),
            Err(e) => {
                log::warn!("Ignoring unreadable scan report: {}", e);
                None
            }
        }
    }

    /// Write the report atomically (temp file in the same directory, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ScanError> {
        let io_err = |source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(self).map_err(|source| ScanError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".missing.")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Add `identifier` to the report's manual list, creating the report if needed.
///
/// Returns `true` if the identifier was newly added.
///
/// # Errors
///
/// Returns [`ScanError::Io`] if the updated report cannot be written.
pub fn mark_manual(path: &Path, identifier: &str, prefix: &str) -> Result<bool, ScanError> {
    let mut report = ScanReport::load_optional(path).unwrap_or_default();
    if report.prefix.is_empty() {
        report.prefix = prefix.to_string();
    }
    if report.manual.iter().any(|m| m == identifier) {
        return Ok(false);
    }
    report.manual.push(identifier.to_string());
    report.save(path)?;
    log::info!("Marked {} as missing", identifier);
    Ok(true)
}

/// Something that can produce a [`ScanReport`] for a set of identifiers.
pub trait Scanner: Send + Sync {
    /// Check every identifier and report which are missing.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if the scan cannot complete.
    fn scan(&self, identifiers: &[String], concurrency: usize) -> Result<ScanReport, ScanError>;
}

/// Scanner that probes the origin directly.
pub struct ProbeScanner {
    origin: Arc<dyn Origin>,
    extension: String,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl ProbeScanner {
    /// Create a scanner probing `origin` for `<id>.<extension>`.
    #[must_use]
    pub fn new(origin: Arc<dyn Origin>, extension: impl Into<String>) -> Self {
        Self {
            origin,
            extension: extension.into(),
            shutdown_flag: None,
        }
    }

    /// Stop probing once the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn probe(&self, identifier: &str) -> bool {
        let Ok(id) = ArtifactId::parse(identifier) else {
            log::warn!("Catalog identifier {:?} is not a valid artifact id", identifier);
            return false;
        };
        match self.origin.exists(&id, &self.extension) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Probe for {} failed: {}", identifier, e);
                false
            }
        }
    }
}

impl Scanner for ProbeScanner {
    fn scan(&self, identifiers: &[String], concurrency: usize) -> Result<ScanReport, ScanError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("gamebin-scan-{i}"))
            .build()?;

        log::info!(
            "Scanning {} identifier(s) against {} with {} worker(s)",
            identifiers.len(),
            self.origin.prefix(),
            concurrency.max(1)
        );

        let mut missing: Vec<String> = pool.install(|| {
            identifiers
                .par_iter()
                .filter(|id| !self.is_shutdown_requested() && !self.probe(id))
                .cloned()
                .collect()
        });
        if self.is_shutdown_requested() {
            return Err(ScanError::Interrupted);
        }
        missing.sort();

        Ok(ScanReport {
            prefix: self.origin.prefix().to_string(),
            scanned: identifiers.len(),
            missing_count: missing.len(),
            missing,
            manual: Vec::new(),
            generated_at: Some(Utc::now()),
        })
    }
}

/// Scanner that delegates to an external program.
///
/// The program receives `GAMEBIN_SCAN_PREFIX`, `GAMEBIN_SCAN_THREADS` and
/// `GAMEBIN_SCAN_OUTPUT` in its environment and must write the report to
/// the output path before exiting successfully.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    argv: Vec<String>,
    prefix: String,
    output: PathBuf,
}

impl CommandScanner {
    /// Create a scanner running `argv` (program followed by arguments).
    #[must_use]
    pub fn new(argv: Vec<String>, prefix: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            prefix: prefix.into(),
            output: output.into(),
        }
    }
}

impl Scanner for CommandScanner {
    fn scan(&self, _identifiers: &[String], concurrency: usize) -> Result<ScanReport, ScanError> {
        let fail = |reason: String| ScanError::Command {
            command: self.argv.clone(),
            reason,
        };
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| fail("empty command".to_string()))?;

        log::info!("Running external scanner {:?}", self.argv);
        let status = Command::new(program)
            .args(args)
            .env("GAMEBIN_SCAN_PREFIX", &self.prefix)
            .env("GAMEBIN_SCAN_THREADS", concurrency.max(1).to_string())
            .env("GAMEBIN_SCAN_OUTPUT", &self.output)
            .status()
            .map_err(|e| fail(e.to_string()))?;
        if !status.success() {
            return Err(fail(format!("exited with {status}")));
        }
        ScanReport::load(&self.output)
    }
}

/// A complete scan: run the scanner, keep the manual list, save the report.
pub struct ScanJob {
    scanner: Arc<dyn Scanner>,
    identifiers: Vec<String>,
    report_path: PathBuf,
    concurrency: usize,
}

impl ScanJob {
    /// Create a job.
    #[must_use]
    pub fn new(
        scanner: Arc<dyn Scanner>,
        identifiers: Vec<String>,
        report_path: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Self {
        Self {
            scanner,
            identifiers,
            report_path: report_path.into(),
            concurrency,
        }
    }

    /// Run the scan in the current thread and persist the report.
    ///
    /// Identifiers flagged by hand in the previous report stay flagged.
    ///
    /// # Errors
    ///
    /// Propagates scanner and persistence failures.
    pub fn run(&self) -> Result<ScanReport, ScanError> {
        // Read first: an external scanner may overwrite the file.
        let previous = ScanReport::load_optional(&self.report_path);
        let mut report = self.scanner.scan(&self.identifiers, self.concurrency)?;
        if let Some(previous) = previous {
            for id in previous.manual {
                if !report.manual.contains(&id) {
                    report.manual.push(id);
                }
            }
        }
        report.save(&self.report_path)?;
        log::info!(
            "Scan finished: {} of {} missing, report at {}",
            report.missing_count,
            report.scanned,
            self.report_path.display()
        );
        Ok(report)
    }
}

/// Starts a background scan exactly once per process.
pub struct ScanTrigger {
    once: Once,
    job: Arc<ScanJob>,
}

impl ScanTrigger {
    /// Create a trigger for `job`.
    #[must_use]
    pub fn new(job: ScanJob) -> Self {
        Self {
            once: Once::new(),
            job: Arc::new(job),
        }
    }

    /// Spawn the scan on a background thread the first time this is called.
    ///
    /// Later calls return `None`. Scan failures are logged, never propagated.
    pub fn trigger_once(&self) -> Option<JoinHandle<()>> {
        let mut handle = None;
        self.once.call_once(|| {
            let job = Arc::clone(&self.job);
            let spawned = std::thread::Builder::new()
                .name("gamebin-scan".to_string())
                .spawn(move || {
                    if let Err(e) = job.run() {
                        log::warn!("Background scan failed: {}", e);
                    }
                });
            match spawned {
                Ok(h) => handle = Some(h),
                Err(e) => log::warn!("Cannot start background scan: {}", e),
            }
        });
        handle
    }

    /// Whether the trigger has fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.once.is_completed()
    }
}
