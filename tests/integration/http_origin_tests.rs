use super::support::{blocking, catalog, origin_server, requests, sha, staging_files};
use gamebin::cache::{ArtifactId, CacheError};
use gamebin::fetch::{Fetcher, FetcherConfig};
use gamebin::origin::{HttpOrigin, Origin, OriginError};
use std::fs;
use std::io::Read;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

// The blocking reqwest client must not run on a runtime worker, so every
// client call goes through `blocking`.

fn id(s: &str) -> ArtifactId {
    ArtifactId::parse(s).unwrap()
}

fn origin(base_url: &str) -> HttpOrigin {
    HttpOrigin::new(format!("{base_url}/"), Some(Duration::from_secs(10))).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_streams_body_with_length() {
    let server = origin_server(&[("/doom.zip", b"doom archive")]).await;
    let base = server.uri();

    let (bytes, length) = blocking(move || {
        let mut body = origin(&base).open(&id("doom"), "zip").unwrap();
        let mut bytes = Vec::new();
        body.reader.read_to_end(&mut bytes).unwrap();
        (bytes, body.content_length)
    })
    .await;

    assert_eq!(bytes, b"doom archive");
    assert_eq!(length, Some(12));
    assert_eq!(requests(&server).await, vec!["GET /doom.zip".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_missing_is_status_error() {
    let server = origin_server(&[]).await;
    let base = server.uri();

    let err = blocking(move || origin(&base).open(&id("ghost"), "zip").unwrap_err()).await;

    match err {
        OriginError::Status { status, url } => {
            assert_eq!(status, 404);
            assert!(url.ends_with("/ghost.zip"), "{url}");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exists_uses_head() {
    let server = origin_server(&[("/doom.zip", b"doom archive")]).await;
    let base = server.uri();

    let (present, absent) = blocking(move || {
        let origin = origin(&base);
        (
            origin.exists(&id("doom"), "zip").unwrap(),
            origin.exists(&id("ghost"), "zip").unwrap(),
        )
    })
    .await;

    assert!(present);
    assert!(!absent);
    let log = requests(&server).await;
    assert!(log.iter().all(|r| r.starts_with("HEAD ")), "{log:?}");
    assert_eq!(log.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_identifier_is_percent_encoded_in_request_path() {
    let server = origin_server(&[("/a%20b.zip", b"spaced")]).await;
    let base = server.uri();

    let bytes = blocking(move || {
        let mut body = origin(&base).open(&id("a b"), "zip").unwrap();
        let mut bytes = Vec::new();
        body.reader.read_to_end(&mut bytes).unwrap();
        bytes
    })
    .await;

    assert_eq!(bytes, b"spaced");
    assert_eq!(requests(&server).await, vec!["GET /a%20b.zip".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_prefix_without_trailing_slash() {
    let server = origin_server(&[("/bin/doom.zip", b"nested")]).await;
    let base = server.uri();

    let (url, found) = blocking({
        let base = base.clone();
        move || {
            let origin = HttpOrigin::new(format!("{base}/bin"), None).unwrap();
            (
                origin.url_for(&id("doom"), "zip").unwrap(),
                origin.exists(&id("doom"), "zip").unwrap(),
            )
        }
    })
    .await;

    assert_eq!(url, format!("{base}/bin/doom.zip"));
    assert!(found);
}

#[test]
fn test_invalid_prefix_is_rejected_at_construction() {
    assert!(matches!(
        HttpOrigin::new("not a url", None),
        Err(OriginError::InvalidPrefix { .. })
    ));
    assert!(matches!(
        HttpOrigin::new("mailto:games@example.com", None),
        Err(OriginError::InvalidPrefix { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetcher_installs_from_http_origin() {
    let archive = b"PK\x03\x04 real bytes over the wire".to_vec();
    let server = wiremock::MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/game-x.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.clone()))
        .expect(1)
        .mount(&server)
        .await;
    let base = server.uri();
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().to_path_buf();

    let (first, second) = blocking({
        let archive = archive.clone();
        move || {
            let fetcher = Fetcher::new(
                FetcherConfig::new(cache_dir),
                Arc::new(catalog(&[("game-x", Some(&sha(&archive)))])),
                Arc::new(origin(&base)),
            );
            let first = fetcher.serve("game-x").unwrap();
            let second = fetcher.serve("game-x").unwrap();
            (first, second)
        }
    })
    .await;

    assert_eq!(first, second);
    assert_eq!(fs::read(&first).unwrap(), archive);
    assert_eq!(requests(&server).await, vec!["GET /game-x.zip".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upstream_404_is_fetch_failed() {
    let server = origin_server(&[]).await;
    let base = server.uri();
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().to_path_buf();

    let err = blocking(move || {
        let fetcher = Fetcher::new(
            FetcherConfig::new(cache_dir),
            Arc::new(catalog(&[("game-x", None)])),
            Arc::new(origin(&base)),
        );
        fetcher.ensure_cached("game-x").unwrap_err()
    })
    .await;

    assert!(matches!(err, CacheError::FetchFailed { .. }));
    assert!(staging_files(dir.path()).is_empty());
}

#[test]
fn test_connection_refused_is_fetch_failed() {
    // Bind then drop to get a port with nothing listening.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let origin = HttpOrigin::new(format!("http://127.0.0.1:{port}/"), None).unwrap();
    let dir = tempdir().unwrap();
    let fetcher = Fetcher::new(
        FetcherConfig::new(dir.path()),
        Arc::new(catalog(&[("game-x", None)])),
        Arc::new(origin),
    );

    let err = fetcher.ensure_cached("game-x").unwrap_err();
    assert!(matches!(err, CacheError::FetchFailed { .. }));
    assert!(err.is_retryable());
    assert!(!dir.path().join("game-x.zip").exists());
}
