//! Output formatters for command results.
//!
//! Every command result implements [`Report`], which gives it a text form;
//! the JSON form comes from serde and is wrapped in a [`json::JsonOutput`]
//! envelope carrying the exit code.
//!
//! # Example
//!
//! ```
//! use gamebin::cache::CacheStats;
//! use gamebin::cli::OutputFormat;
//! use gamebin::error::ExitCode;
//! use gamebin::output::emit;
//!
//! let stats = CacheStats { count: 2, total_bytes: 2048, max_bytes: 4096 };
//! let mut out = Vec::new();
//! emit(&mut out, OutputFormat::Json, &stats, ExitCode::Success).unwrap();
//! assert!(String::from_utf8(out).unwrap().contains("\"total_bytes\": 2048"));
//! ```

pub mod json;
pub mod text;

use std::io::{self, Write};

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::ExitCode;

pub use json::JsonOutput;

/// A command result that can be printed.
pub trait Report: Serialize {
    /// Write the human-readable form.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    fn write_text(&self, w: &mut dyn Write) -> io::Result<()>;
}

/// Write `report` to `w` in the requested format.
///
/// # Errors
///
/// Propagates write and serialization failures.
pub fn emit<R: Report>(
    w: &mut dyn Write,
    format: OutputFormat,
    report: &R,
    exit_code: ExitCode,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => report.write_text(w),
        OutputFormat::Json => JsonOutput::new(report, exit_code).write_to(w),
    }
}
