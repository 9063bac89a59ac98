//! Logging setup for the CLI.
//!
//! Library code only uses the `log` macros; this module installs the
//! `env_logger` backend once per process.
//!
//! The filter comes from `GAMEBIN_LOG` when set (same syntax as `RUST_LOG`,
//! e.g. `GAMEBIN_LOG=gamebin::fetch=trace`). Otherwise `-q`, `-v` and `-vv`
//! pick the level for gamebin itself, while the HTTP stack stays at warn
//! unless `-vvv` is given.
//!
//! ```rust,no_run
//! use gamebin::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("Cache hit for doom");
//! ```

use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Environment variable holding an explicit filter directive.
pub const LOG_ENV: &str = "GAMEBIN_LOG";

/// Crates whose chatter is capped below `-vvv`.
const NOISY_DEPENDENCIES: &[&str] = &["reqwest", "hyper", "hyper_util", "rustls", "h2"];

/// Resolved filter levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Levels {
    own: LevelFilter,
    dependencies: LevelFilter,
}

impl Levels {
    fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self {
                own: LevelFilter::Error,
                dependencies: LevelFilter::Error,
            };
        }
        let own = match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        let dependencies = if verbose >= 3 {
            LevelFilter::Trace
        } else {
            LevelFilter::Warn
        };
        Self { own, dependencies }
    }
}

/// Install the global logger.
///
/// Only the first call in a process takes effect, so tests may call
/// [`crate::run_app`] repeatedly.
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = std::env::var_os(LOG_ENV).is_some();
    let mut builder = if from_env {
        Builder::from_env(Env::new().filter(LOG_ENV))
    } else {
        let levels = Levels::from_flags(verbose, quiet);
        let mut builder = Builder::new();
        builder.filter_level(levels.own);
        for dep in NOISY_DEPENDENCIES {
            builder.filter_module(dep, levels.dependencies);
        }
        builder
    };

    let detailed = verbose >= 1 || from_env;
    builder.format(move |buf, record| {
        let style = buf.default_level_style(record.level());
        if detailed {
            writeln!(
                buf,
                "{} {style}{:<5}{style:#} [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                short_target(record.target()),
                record.args()
            )
        } else {
            writeln!(buf, "{style}{:<5}{style:#} {}", record.level(), record.args())
        }
    });

    if builder.try_init().is_ok() {
        log::trace!("Logger ready (max level {})", log::max_level());
    }
}

/// `gamebin::cache::eviction` becomes `cache::eviction`; other targets are kept.
fn short_target(target: &str) -> &str {
    target
        .strip_prefix("gamebin::")
        .filter(|rest| !rest.is_empty())
        .unwrap_or(target)
}
