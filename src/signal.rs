//! Ctrl+C handling.
//!
//! The first Ctrl+C sets a shared flag. `fetch` with several identifiers and
//! `scan` check it between items and stop early, so the download in progress
//! still completes and verifies. A second Ctrl+C exits at once with code 130;
//! the staging file it leaves behind is never promoted and is removed by
//! `gamebin sweep`.
//!
//! ```rust,no_run
//! use gamebin::signal::install_handler;
//!
//! let handler = install_handler()?;
//! let flag = handler.flag();
//! # Ok::<(), gamebin::signal::SignalError>(())
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::ExitCode;

/// Shared stop request. Clones observe the same flag.
///
/// # Thread Safety
///
/// `ShutdownHandler` is `Send + Sync`. The flag is an `AtomicBool`, so the
/// Ctrl+C thread, the scan pool and the fetch loop can all read it at once.
///
/// # Example
///
/// ```rust
/// use gamebin::signal::ShutdownHandler;
/// use std::sync::atomic::Ordering;
///
/// let handler = ShutdownHandler::new();
/// let flag = handler.flag();
///
/// handler.request_shutdown();
/// assert!(flag.load(Ordering::SeqCst));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// A handler with no stop requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request a stop, as Ctrl+C would.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The underlying flag, for [`crate::service::GameService::with_shutdown_flag`].
    ///
    /// # Returns
    ///
    /// An `Arc<AtomicBool>` sharing state with this handler and its clones.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Errors installing the Ctrl+C hook.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The platform refused the hook.
    #[error("cannot install Ctrl+C handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();
static HOOKED: Mutex<bool> = Mutex::new(false);
static PRESSES: AtomicU8 = AtomicU8::new(0);

fn on_interrupt(handler: &ShutdownHandler) {
    if PRESSES.fetch_add(1, Ordering::SeqCst) == 0 {
        handler.request_shutdown();
        eprintln!("\nStopping after the current download (Ctrl+C again to abort)");
        log::info!("Shutdown requested");
    } else {
        eprintln!("\nAborted");
        std::process::exit(ExitCode::Interrupted.as_i32());
    }
}

/// Hook Ctrl+C and return the process-wide handler.
///
/// The hook is installed once; later calls return the same handler with its
/// flag cleared.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the platform refuses the hook,
/// for example when another component already registered one.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    let handler = GLOBAL_HANDLER.get_or_init(ShutdownHandler::new);
    handler.reset();
    PRESSES.store(0, Ordering::SeqCst);

    let mut hooked = HOOKED.lock().unwrap_or_else(PoisonError::into_inner);
    if !*hooked {
        let target = handler.clone();
        ctrlc::set_handler(move || on_interrupt(&target))?;
        *hooked = true;
        log::debug!("Ctrl+C hook installed");
    }
    Ok(handler.clone())
}
