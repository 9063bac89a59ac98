//! Human-readable renderings of command results.

use std::io::{self, Write};

use bytesize::ByteSize;

use super::Report;
use crate::cache::{CacheStats, EvictionReport};
use crate::scan::ScanReport;
use crate::service::{FetchSummary, MarkOutcome};
use crate::status::{ArtifactCheck, StatusListing};

fn yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "n/a",
    }
}

impl Report for CacheStats {
    fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{} archive(s), {} of {} used",
            self.count,
            self.total_human(),
            self.max_human()
        )?;
        if self.over_budget() {
            writeln!(w, "warning: cache is over budget")?;
        }
        Ok(())
    }
}

impl Report for EvictionReport {
    fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        for path in &self.removed {
            writeln!(w, "removed {}", path.display())?;
        }
        for (path, reason) in &self.failures {
            writeln!(w, "failed  {}: {}", path.display(), reason)?;
        }
        writeln!(
            w,
            "{} ({} remaining)",
            self.summary(),
            ByteSize::b(self.remaining_bytes)
        )
    }
}

impl Report for FetchSummary {
    fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        for outcome in &self.outcomes {
            match (&outcome.path, &outcome.error) {
                (Some(path), _) => writeln!(w, "{}: {}", outcome.identifier, path.display())?,
                (None, Some(err)) => writeln!(w, "{}: FAILED: {}", outcome.identifier, err)?,
                (None, None) => writeln!(w, "{}: skipped", outcome.identifier)?,
            }
        }
        if self.interrupted {
            writeln!(w, "interrupted")?;
        }
        Ok(())
    }
}

impl Report for ArtifactCheck {
    fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "identifier:      {}", self.identifier)?;
        writeln!(w, "path:            {}", self.path.display())?;
        writeln!(w, "exists:          {}", yes_no(Some(self.exists)))?;
        writeln!(w, "size:            {}", ByteSize::b(self.size))?;
        writeln!(
            w,
            "expected sha256: {}",
            self.expected_sha256.as_deref().unwrap_or("-")
        )?;
        writeln!(
            w,
            "actual sha256:   {}",
            self.actual_sha256.as_deref().unwrap_or("-")
        )?;
        writeln!(w, "sha match:       {}", yes_no(self.sha_match))?;
        writeln!(w, "zip ok:          {}", yes_no(self.zip_ok))?;
        if self.verification_disabled {
            writeln!(w, "note: hash verification is disabled")?;
        }
        Ok(())
    }
}

impl Report for StatusListing {
    fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        for item in &self.items {
            writeln!(
                w,
                "{:<12} {:<32} {}",
                item.status.label(),
                item.identifier,
                item.name
            )?;
        }
        writeln!(
            w,
            "{} game(s): {} ok, {} error, {} missing",
            self.total_all, self.total_ok, self.total_error, self.total_missing
        )
    }
}

impl Report for ScanReport {
    fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        for id in &self.missing {
            writeln!(w, "missing {id}")?;
        }
        writeln!(
            w,
            "{} of {} game(s) missing from {}",
            self.missing_count, self.scanned, self.prefix
        )?;
        if !self.manual.is_empty() {
            writeln!(w, "{} flagged by hand", self.manual.len())?;
        }
        Ok(())
    }
}

impl Report for MarkOutcome {
    fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        if self.added {
            writeln!(
                w,
                "{} marked as missing in {}",
                self.identifier,
                self.report_path.display()
            )
        } else {
            writeln!(w, "{} was already marked as missing", self.identifier)
        }
    }
}
