//! Shared fixtures: an in-memory origin, a mock HTTP origin and catalog helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gamebin::cache::{sha256_hex, ArtifactId};
use gamebin::catalog::{CatalogEntry, GameCatalog};
use gamebin::fetch::{Fetcher, FetcherConfig};
use gamebin::origin::{Origin, OriginBody, OriginError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Failure injected into [`MockOrigin`] responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// Declare more bytes than are sent
    Truncate,
    /// Return an I/O error halfway through the body
    BreakMidway,
}

/// In-memory origin that counts requests.
pub struct MockOrigin {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    opens: AtomicUsize,
    probes: AtomicUsize,
    delay: Duration,
    fault: Fault,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self {
            bodies: Mutex::new(HashMap::new()),
            opens: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fault: Fault::None,
        }
    }

    pub fn with_body(self, identifier: &str, body: &[u8]) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(identifier.to_string(), body.to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    pub fn set_body(&self, identifier: &str, body: &[u8]) {
        self.bodies
            .lock()
            .unwrap()
            .insert(identifier.to_string(), body.to_vec());
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

struct BrokenReader {
    inner: Cursor<Vec<u8>>,
    fail_at: u64,
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inner.position() >= self.fail_at {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        }
        let room = (self.fail_at - self.inner.position()) as usize;
        let n = room.min(buf.len());
        self.inner.read(&mut buf[..n])
    }
}

impl Origin for MockOrigin {
    fn url_for(&self, id: &ArtifactId, extension: &str) -> Result<String, OriginError> {
        Ok(format!("mock://origin/{}", id.file_name(extension)))
    }

    fn open(&self, id: &ArtifactId, extension: &str) -> Result<OriginBody, OriginError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let body = self.bodies.lock().unwrap().get(id.as_str()).cloned();
        let Some(body) = body else {
            return Err(OriginError::Status {
                url: self.url_for(id, extension)?,
                status: 404,
            });
        };
        let len = body.len() as u64;
        Ok(match self.fault {
            Fault::None => OriginBody {
                reader: Box::new(Cursor::new(body)),
                content_length: Some(len),
            },
            Fault::Truncate => OriginBody {
                reader: Box::new(Cursor::new(body)),
                content_length: Some(len + 10),
            },
            Fault::BreakMidway => OriginBody {
                reader: Box::new(BrokenReader {
                    inner: Cursor::new(body),
                    fail_at: len / 2,
                }),
                content_length: None,
            },
        })
    }

    fn exists(&self, id: &ArtifactId, _extension: &str) -> Result<bool, OriginError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.bodies.lock().unwrap().contains_key(id.as_str()))
    }

    fn prefix(&self) -> &str {
        "mock://origin/"
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha(bytes: &[u8]) -> String {
    sha256_hex(bytes)
}

/// Catalog from `(identifier, expected sha256)` pairs.
pub fn catalog(entries: &[(&str, Option<&str>)]) -> GameCatalog {
    GameCatalog::from_entries(
        entries
            .iter()
            .map(|(id, sha)| CatalogEntry::new(*id, *sha)),
    )
}

/// Fetcher over `cache_dir` with default tunables.
pub fn fetcher(cache_dir: &Path, catalog: GameCatalog, origin: Arc<MockOrigin>) -> Fetcher {
    fetcher_with(FetcherConfig::new(cache_dir), catalog, origin)
}

pub fn fetcher_with(
    config: FetcherConfig,
    catalog: GameCatalog,
    origin: Arc<MockOrigin>,
) -> Fetcher {
    Fetcher::new(config, Arc::new(catalog), origin)
}

/// Staging files currently in `dir`.
pub fn staging_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    read_dir
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().ends_with(".part"))
        .collect()
}

/// Mock origin server answering GET and HEAD for each `(path, body)`.
///
/// Every other path gets wiremock's default 404.
pub async fn origin_server(files: &[(&str, &[u8])]) -> MockServer {
    let server = MockServer::start().await;
    for (route, body) in files {
        Mock::given(method("GET"))
            .and(path(*route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/zip")
                    .set_body_bytes(body.to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path(*route))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
    }
    server
}

/// `"METHOD /path"` for every request the server received so far.
pub async fn requests(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect()
}

/// Run blocking client code off the async test runtime.
pub async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

/// Write a small valid ZIP archive with one stored member.
pub fn zip_bytes(member: &str, data: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file(member, options).unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Service configuration rooted in `root`: cache, catalog and report inside it.
pub fn service_config(root: &Path) -> gamebin::config::Config {
    gamebin::config::Config {
        cache_dir: root.join("cache"),
        catalog_path: root.join("games.json"),
        scan_report_path: root.join("missing.json"),
        scan_threads: 4,
        ..gamebin::config::Config::default()
    }
}
