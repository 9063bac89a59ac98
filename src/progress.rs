//! Download progress reporting.
//!
//! The fetch pipeline reports through [`DownloadProgress`]; the library
//! default is [`NoProgress`]. The CLI plugs in [`Progress`], which draws an
//! indicatif bar per download on stderr.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receives progress updates while an artifact downloads.
pub trait DownloadProgress: Send + Sync {
    /// A download is starting. `total` is the declared body length, if any.
    fn on_start(&self, identifier: &str, total: Option<u64>);

    /// `bytes` more bytes were written to the staging file.
    fn on_bytes(&self, bytes: u64);

    /// The download finished (`ok == false` on any failure).
    fn on_finish(&self, identifier: &str, ok: bool);
}

/// Progress sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_start(&self, _identifier: &str, _total: Option<u64>) {}
    fn on_bytes(&self, _bytes: u64) {}
    fn on_finish(&self, _identifier: &str, _ok: bool) {}
}

/// Terminal progress bars using indicatif.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a reporter. With `quiet`, nothing is drawn.
    ///
    /// # Examples
    ///
    /// ```
    /// use gamebin::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn sized_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
    }

    fn unsized_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.bar
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl DownloadProgress for Progress {
    fn on_start(&self, identifier: &str, total: Option<u64>) {
        if self.quiet {
            return;
        }
        let bar = match total {
            Some(len) => ProgressBar::new(len).with_style(Self::sized_style()),
            None => ProgressBar::new_spinner().with_style(Self::unsized_style()),
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.set_message(identifier.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        if let Some(old) = self.slot().replace(bar) {
            old.finish_and_clear();
        }
    }

    fn on_bytes(&self, bytes: u64) {
        if let Some(bar) = self.slot().as_ref() {
            bar.inc(bytes);
        }
    }

    fn on_finish(&self, identifier: &str, ok: bool) {
        if let Some(bar) = self.slot().take() {
            if ok {
                bar.finish_with_message(format!("{identifier} done"));
            } else {
                bar.abandon_with_message(format!("{identifier} failed"));
            }
        }
    }
}
