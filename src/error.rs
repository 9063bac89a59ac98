//! Structured error handling and exit codes.

use serde::Serialize;

use crate::cache::CacheError;
use crate::scan::ScanError;

/// Exit codes for the gamebin CLI.
///
/// - 0: Success
/// - 1: General error (bad configuration, local I/O failure)
/// - 2: Not found (identifier not in the catalog)
/// - 3: Upstream error (download failed or integrity mismatch)
/// - 4: Partial success (some items of a multi-item command failed)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the command completed.
    Success = 0,
    /// General error: an unexpected error occurred.
    GeneralError = 1,
    /// Not found: the identifier is not in the catalog.
    NotFound = 2,
    /// Upstream error: the origin failed or served bad content.
    UpstreamError = 3,
    /// Partial success: some items failed.
    PartialSuccess = 4,
    /// Interrupted: the command was interrupted by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "GB000",
            Self::GeneralError => "GB001",
            Self::NotFound => "GB002",
            Self::UpstreamError => "GB003",
            Self::PartialSuccess => "GB004",
            Self::Interrupted => "GB130",
        }
    }

    /// Classify a pipeline error.
    #[must_use]
    pub fn from_cache_error(err: &CacheError) -> Self {
        match err {
            CacheError::NotFound(_) => Self::NotFound,
            CacheError::FetchFailed { .. } | CacheError::IntegrityMismatch { .. } => {
                Self::UpstreamError
            }
            CacheError::Io { .. } => Self::GeneralError,
        }
    }

    /// Classify an application error by the first recognized cause in its chain.
    #[must_use]
    pub fn classify(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(cache) = cause.downcast_ref::<CacheError>() {
                return Self::from_cache_error(cache);
            }
            if matches!(cause.downcast_ref::<ScanError>(), Some(ScanError::Interrupted)) {
                return Self::Interrupted;
            }
        }
        Self::GeneralError
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "GB001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether a retry may succeed
    pub retryable: bool,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        let retryable = err
            .chain()
            .find_map(|c| c.downcast_ref::<CacheError>())
            .is_some_and(CacheError::is_retryable);
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            retryable,
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
