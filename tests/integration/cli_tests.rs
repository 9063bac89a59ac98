use super::support::{blocking, origin_server, requests, sha, zip_bytes};
use clap::Parser;
use gamebin::cli::Cli;
use gamebin::error::ExitCode;
use gamebin::run_app;
use gamebin::scan::ScanReport;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use wiremock::MockServer;

struct Fixture {
    dir: TempDir,
    config: PathBuf,
    archive: Vec<u8>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let archive = zip_bytes("GAME.EXE", b"MZ game");
        let catalog = dir.path().join("games.json");
        fs::write(
            &catalog,
            format!(
                r#"{{"games": {{"game-x": {{"sha256": "{}"}}, "gone": {{}}}}}}"#,
                sha(&archive)
            ),
        )
        .unwrap();
        let config = dir.path().join("config.toml");
        fs::write(
            &config,
            format!(
                "cache_dir = {:?}\ncatalog_path = {:?}\nscan_report_path = {:?}\nscan_threads = 2\n",
                dir.path().join("cache"),
                catalog,
                dir.path().join("missing.json"),
            ),
        )
        .unwrap();
        Self {
            dir,
            config,
            archive,
        }
    }

    fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    fn run(&self, origin: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        let mut argv = vec![
            "gamebin",
            "-q",
            "--config",
            self.config.to_str().unwrap(),
            "--origin",
            origin,
        ];
        argv.extend_from_slice(args);
        run_app(Cli::parse_from(argv))
    }
}

/// Run the CLI against `server` on a blocking thread.
async fn run_against(
    fixture: &Arc<Fixture>,
    server: &MockServer,
    args: &[&str],
) -> anyhow::Result<ExitCode> {
    let fixture = Arc::clone(fixture);
    let origin = format!("{}/", server.uri());
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        fixture.run(&origin, &args)
    })
    .await
}

async fn server_for(fixture: &Fixture) -> MockServer {
    origin_server(&[("/game-x.zip", fixture.archive.as_slice())]).await
}

fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).map_or(0, |rd| rd.count())
}

#[test]
fn test_stats_on_empty_cache() {
    let fixture = Fixture::new();
    let code = fixture.run("http://127.0.0.1:9/", &["stats"]).unwrap();
    assert_eq!(code, ExitCode::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_installs_archive() {
    let fixture = Arc::new(Fixture::new());
    let server = server_for(&fixture).await;

    let code = run_against(&fixture, &server, &["-o", "json", "fetch", "game-x"])
        .await
        .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert_eq!(
        fs::read(fixture.cache_dir().join("game-x.zip")).unwrap(),
        fixture.archive
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_unknown_identifier_exit_code() {
    let fixture = Arc::new(Fixture::new());
    let server = server_for(&fixture).await;

    let code = run_against(&fixture, &server, &["fetch", "no-such-game"])
        .await
        .unwrap();

    assert_eq!(code, ExitCode::NotFound);
    assert!(requests(&server).await.is_empty());
    assert_eq!(file_count(&fixture.cache_dir()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_partial_failure_exit_code() {
    let fixture = Arc::new(Fixture::new());
    let server = server_for(&fixture).await;

    // "gone" is in the catalog but the origin answers 404.
    let code = run_against(&fixture, &server, &["fetch", "game-x", "gone"])
        .await
        .unwrap();

    assert_eq!(code, ExitCode::PartialSuccess);
    assert!(fixture.cache_dir().join("game-x.zip").exists());
    assert!(!fixture.cache_dir().join("gone.zip").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_upstream_failure_exit_code() {
    let fixture = Arc::new(Fixture::new());
    let server = origin_server(&[]).await;

    let code = run_against(&fixture, &server, &["fetch", "game-x"])
        .await
        .unwrap();
    assert_eq!(code, ExitCode::UpstreamError);
}

#[test]
fn test_check_unknown_identifier_is_not_found() {
    let fixture = Fixture::new();

    let err = fixture
        .run("http://127.0.0.1:9/", &["check", "nope"])
        .unwrap_err();

    assert_eq!(ExitCode::classify(&err), ExitCode::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clear_and_evict_commands() {
    let fixture = Arc::new(Fixture::new());
    let server = server_for(&fixture).await;
    run_against(&fixture, &server, &["fetch", "game-x"])
        .await
        .unwrap();

    let code = run_against(&fixture, &server, &["evict", "--max-size", "0"])
        .await
        .unwrap();
    assert_eq!(code, ExitCode::Success);
    assert!(!fixture.cache_dir().join("game-x.zip").exists());

    run_against(&fixture, &server, &["fetch", "game-x"])
        .await
        .unwrap();
    let code = run_against(&fixture, &server, &["clear"]).await.unwrap();
    assert_eq!(code, ExitCode::Success);
    assert!(!fixture.cache_dir().join("game-x.zip").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scan_and_mark_missing_commands() {
    let fixture = Arc::new(Fixture::new());
    let server = server_for(&fixture).await;
    let report_path = fixture.dir.path().join("missing.json");

    let code = run_against(&fixture, &server, &["-o", "json", "scan", "--threads", "2"])
        .await
        .unwrap();
    assert_eq!(code, ExitCode::Success);
    let report = ScanReport::load(&report_path).unwrap();
    assert_eq!(report.missing, vec!["gone".to_string()]);

    let code = run_against(&fixture, &server, &["mark-missing", "game-x"])
        .await
        .unwrap();
    assert_eq!(code, ExitCode::Success);
    let report = ScanReport::load(&report_path).unwrap();
    assert_eq!(report.manual, vec!["game-x".to_string()]);

    // Both games are hidden now.
    let code = run_against(&fixture, &server, &["fetch", "game-x"])
        .await
        .unwrap();
    assert_eq!(code, ExitCode::NotFound);

    let code = run_against(&fixture, &server, &["status", "--group", "missing"])
        .await
        .unwrap();
    assert_eq!(code, ExitCode::Success);
}

#[test]
fn test_sweep_command() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.cache_dir()).unwrap();
    let orphan = fixture.cache_dir().join("game-x.abc123.part");
    fs::write(&orphan, b"partial").unwrap();

    let code = fixture
        .run("http://127.0.0.1:9/", &["sweep", "--older-than-secs", "0"])
        .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(!orphan.exists());
}
