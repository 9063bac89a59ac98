//! JSON output envelope.
//!
//! Provides machine-readable output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "result": { "count": 3, "total_bytes": 1048576, "max_bytes": 5368709120 },
//!   "exit_code": 0,
//!   "exit_code_name": "GB000"
//! }
//! ```

use std::io::{self, Write};

use serde::Serialize;

use crate::error::ExitCode;

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a, T: Serialize> {
    /// Command result
    pub result: &'a T,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "GB000")
    pub exit_code_name: &'static str,
}

impl<'a, T: Serialize> JsonOutput<'a, T> {
    /// Wrap a result with its exit code.
    #[must_use]
    pub fn new(result: &'a T, exit_code: ExitCode) -> Self {
        Self {
            result,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix(),
        }
    }

    /// Serialize to a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to a pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty-printed JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        let json = self.to_json_pretty().map_err(io::Error::other)?;
        writeln!(w, "{json}")
    }
}
