//! gamebin - on-demand fetch, verify and LRU cache for retro game archives
//!
//! Game packages live on a static origin as `<identifier>.zip`. The first
//! request for a game downloads its archive into a local cache directory,
//! checks it against the catalog's SHA-256 digest and renames it into place;
//! later requests are served from disk. The cache is kept under a byte budget
//! by evicting the least recently accessed archives.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gamebin::catalog::GameCatalog;
//! use gamebin::fetch::{Fetcher, FetcherConfig};
//! use gamebin::origin::HttpOrigin;
//!
//! let catalog = GameCatalog::from_json_str(r#"{"games": {"doom": {"sha256": "..."}}}"#)?;
//! let origin = HttpOrigin::new("https://dos-bin.zczc.cz/", None)?;
//! let fetcher = Fetcher::new(
//!     FetcherConfig::new("/var/cache/gamebin"),
//!     Arc::new(catalog),
//!     Arc::new(origin),
//! );
//! let path = fetcher.serve("doom")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod origin;
pub mod output;
pub mod progress;
pub mod scan;
pub mod service;
pub mod signal;
pub mod status;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use cli::{Cli, Commands};
use config::Config;
use error::ExitCode;
use output::emit;
use progress::Progress;
use service::GameService;
use status::StatusQuery;

/// Run the CLI application. Returns the process exit code.
///
/// # Errors
///
/// Returns an error for configuration problems, catalog load failures and
/// single-item commands that fail.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let handler = signal::install_handler().context("installing Ctrl+C handler")?;

    let config = Config::load(cli.config.as_deref())
        .context("loading configuration")?
        .merge_cli(&cli)
        .context("applying command-line overrides")?;
    log::debug!("Using cache directory {}", config.cache_dir.display());

    let service = GameService::open(config)?
        .with_progress(Arc::new(Progress::new(cli.quiet)))
        .with_shutdown_flag(handler.flag());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let format = cli.output;

    let code = match &cli.command {
        Commands::Fetch(args) => {
            let summary = service.fetch_all(&args.identifiers);
            let code = summary.exit_code();
            emit(&mut out, format, &summary, code)?;
            code
        }
        Commands::Stats => {
            emit(&mut out, format, &service.stats(), ExitCode::Success)?;
            ExitCode::Success
        }
        Commands::Evict(args) => {
            let report = service.evict(args.max_size);
            let code = if report.failures.is_empty() {
                ExitCode::Success
            } else {
                ExitCode::PartialSuccess
            };
            emit(&mut out, format, &report, code)?;
            code
        }
        Commands::Clear => {
            let report = service.clear();
            let code = if report.failures.is_empty() {
                ExitCode::Success
            } else {
                ExitCode::PartialSuccess
            };
            emit(&mut out, format, &report, code)?;
            code
        }
        Commands::Check(args) => {
            let check = service.check(&args.identifier)?;
            emit(&mut out, format, &check, ExitCode::Success)?;
            ExitCode::Success
        }
        Commands::Status(args) => {
            let query = StatusQuery {
                keyword: args.query.clone(),
                group: args.group,
                limit: args.limit,
            };
            emit(&mut out, format, &service.status(&query), ExitCode::Success)?;
            ExitCode::Success
        }
        Commands::Scan(args) => {
            let report = service.scan(args.threads, args.prefix.as_deref())?;
            emit(&mut out, format, &report, ExitCode::Success)?;
            ExitCode::Success
        }
        Commands::MarkMissing(args) => {
            let outcome = service.mark_missing(&args.identifier)?;
            emit(&mut out, format, &outcome, ExitCode::Success)?;
            ExitCode::Success
        }
        Commands::Sweep(args) => {
            let report = service.sweep(Duration::from_secs(args.older_than_secs));
            emit(&mut out, format, &report, ExitCode::Success)?;
            ExitCode::Success
        }
    };
    Ok(code)
}
