use super::support::{catalog, fetcher, fetcher_with, sha, staging_files, MockOrigin};
use gamebin::fetch::FetcherConfig;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_concurrent_misses_share_one_download() {
    let dir = tempdir().unwrap();
    let body = vec![42u8; 64 * 1024];
    let origin = Arc::new(
        MockOrigin::new()
            .with_body("game-x", &body)
            .with_delay(Duration::from_millis(200)),
    );
    let fetcher = Arc::new(fetcher(
        dir.path(),
        catalog(&[("game-x", Some(&sha(&body)))]),
        origin.clone(),
    ));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let fetcher = Arc::clone(&fetcher);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                fetcher.ensure_cached("game-x")
            })
        })
        .collect();

    for handle in handles {
        let path = handle.join().unwrap().unwrap();
        assert_eq!(fs::read(path).unwrap(), body);
    }
    assert_eq!(origin.opens(), 1);
    assert!(staging_files(dir.path()).is_empty());
}

#[test]
fn test_without_single_flight_every_request_still_succeeds() {
    let dir = tempdir().unwrap();
    let body = vec![7u8; 32 * 1024];
    let origin = Arc::new(
        MockOrigin::new()
            .with_body("game-x", &body)
            .with_delay(Duration::from_millis(50)),
    );
    let config = FetcherConfig {
        single_flight: false,
        ..FetcherConfig::new(dir.path())
    };
    let fetcher = Arc::new(fetcher_with(
        config,
        catalog(&[("game-x", Some(&sha(&body)))]),
        origin.clone(),
    ));

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let fetcher = Arc::clone(&fetcher);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                fetcher.ensure_cached("game-x")
            })
        })
        .collect();

    for handle in handles {
        let path = handle.join().unwrap().unwrap();
        assert_eq!(fs::read(path).unwrap(), body);
    }
    assert!(origin.opens() >= 1);
    assert!(staging_files(dir.path()).is_empty());
}

#[test]
fn test_distinct_identifiers_download_in_parallel() {
    let dir = tempdir().unwrap();
    let names: Vec<String> = (0..6).map(|i| format!("game-{i}")).collect();
    let mut origin = MockOrigin::new().with_delay(Duration::from_millis(20));
    let mut entries = Vec::new();
    for name in &names {
        let body = name.repeat(100);
        origin = origin.with_body(name, body.as_bytes());
        entries.push((name.clone(), sha(body.as_bytes())));
    }
    let pairs: Vec<(&str, Option<&str>)> = entries
        .iter()
        .map(|(n, h)| (n.as_str(), Some(h.as_str())))
        .collect();
    let origin = Arc::new(origin);
    let fetcher = Arc::new(fetcher(dir.path(), catalog(&pairs), origin.clone()));

    let handles: Vec<_> = names
        .iter()
        .cloned()
        .map(|name| {
            let fetcher = Arc::clone(&fetcher);
            thread::spawn(move || fetcher.ensure_cached(&name))
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
    assert_eq!(origin.opens(), names.len());
    assert_eq!(fetcher.stats().count, names.len());
}

#[test]
fn test_readers_never_observe_partial_archive() {
    let dir = tempdir().unwrap();
    let body = vec![0xA5u8; 256 * 1024];
    let origin = Arc::new(MockOrigin::new().with_body("game-x", &body));
    let fetcher = Arc::new(fetcher(
        dir.path(),
        catalog(&[("game-x", Some(&sha(&body)))]),
        origin,
    ));
    let dest = dir.path().join("game-x.zip");
    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let stop = Arc::clone(&stop);
        let dest = dest.clone();
        let expected = body.clone();
        thread::spawn(move || {
            let mut observed = 0;
            while !stop.load(Ordering::SeqCst) {
                // Either absent or complete; never a prefix of the body.
                if let Ok(bytes) = fs::read(&dest) {
                    assert_eq!(bytes.len(), expected.len());
                    assert_eq!(bytes, expected);
                    observed += 1;
                }
            }
            observed
        })
    };

    for _ in 0..20 {
        fetcher.ensure_cached("game-x").unwrap();
        fetcher.clear();
    }
    fetcher.ensure_cached("game-x").unwrap();
    stop.store(true, Ordering::SeqCst);

    reader.join().unwrap();
    assert!(dest.is_file());
}
