//! Integration tests for the downloader

use httpmock::prelude::*;
use md5::{Digest, Md5};
use otad_config::NetworkConfig;
use otad_events::{channel, UpdateEvent};
use otad_net::{fetch_package, verify_package, DownloadRequest, NetClient};
use otad_types::PackageDescriptor;
use tempfile::tempdir;
use tokio::sync::watch;

fn md5_hex(content: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn descriptor(url: String, content: &[u8]) -> PackageDescriptor {
    PackageDescriptor {
        version: "1.0.0".into(),
        url,
        file_name: "pkg.zip".into(),
        size_bytes: content.len() as u64,
        md5_hex: md5_hex(content),
    }
}

fn client() -> NetClient {
    NetClient::new(&NetworkConfig::default()).unwrap()
}

#[tokio::test]
async fn downloads_and_verifies_package() {
    let server = MockServer::start();
    let content: Vec<u8> = (0u32..2000).flat_map(u32::to_le_bytes).collect();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/pkg.zip");
        then.status(200).body(&content);
    });

    let temp = tempdir().unwrap();
    let staging = temp.path().join("pkg.zip");
    let (tx, mut rx) = channel();
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    // Uppercase digest in the descriptor: compare must be case-insensitive.
    let mut desc = descriptor(server.url("/pkg.zip"), &content);
    desc.md5_hex = desc.md5_hex.to_ascii_uppercase();

    let mut persisted = Vec::new();
    let outcome = fetch_package(
        &client(),
        &DownloadRequest {
            descriptor: &desc,
            staging_path: &staging,
            resume_from: 0,
            progress_step_percent: 5,
        },
        &tx,
        &cancel_rx,
        |bytes| persisted.push(bytes),
    )
    .await
    .unwrap();

    mock.assert();
    assert_eq!(outcome.bytes, content.len() as u64);
    verify_package(&outcome, &desc, &staging).await.unwrap();

    let on_disk = tokio::fs::read(&staging).await.unwrap();
    assert_eq!(on_disk, content);

    // Persisted counts are monotonic and end at the total.
    assert!(persisted.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*persisted.last().unwrap(), content.len() as u64);

    let mut saw_started = false;
    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            UpdateEvent::DownloadStarted { resumed_from, .. } => {
                saw_started = true;
                assert_eq!(resumed_from, 0);
            }
            UpdateEvent::DownloadCompleted { bytes } => {
                saw_completed = true;
                assert_eq!(bytes, content.len() as u64);
            }
            _ => {}
        }
    }
    assert!(saw_started && saw_completed);
}

#[tokio::test]
async fn resumes_with_range_request_and_reseeded_hash() {
    let server = MockServer::start();
    let content: Vec<u8> = (0u8..=255).cycle().take(4000).collect();
    let split = 1500usize;
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/pkg.zip")
            .header("range", format!("bytes={split}-"));
        then.status(206).body(&content[split..]);
    });

    let temp = tempdir().unwrap();
    let staging = temp.path().join("pkg.zip");
    tokio::fs::write(&staging, &content[..split]).await.unwrap();

    let (tx, _rx) = channel();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let desc = descriptor(server.url("/pkg.zip"), &content);

    let outcome = fetch_package(
        &client(),
        &DownloadRequest {
            descriptor: &desc,
            staging_path: &staging,
            resume_from: split as u64,
            progress_step_percent: 5,
        },
        &tx,
        &cancel_rx,
        |_| {},
    )
    .await
    .unwrap();

    mock.assert();
    assert_eq!(outcome.bytes, content.len() as u64);
    // Hash covers the re-read prefix plus the streamed remainder.
    assert_eq!(outcome.md5_hex, desc.md5_hex);
    verify_package(&outcome, &desc, &staging).await.unwrap();
}

#[tokio::test]
async fn restarts_when_server_ignores_range() {
    let server = MockServer::start();
    let content = b"full body served regardless of the range header".to_vec();
    server.mock(|when, then| {
        when.method(GET).path("/pkg.zip");
        then.status(200).body(&content);
    });

    let temp = tempdir().unwrap();
    let staging = temp.path().join("pkg.zip");
    tokio::fs::write(&staging, &content[..10]).await.unwrap();

    let (tx, _rx) = channel();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let desc = descriptor(server.url("/pkg.zip"), &content);

    let outcome = fetch_package(
        &client(),
        &DownloadRequest {
            descriptor: &desc,
            staging_path: &staging,
            resume_from: 10,
            progress_step_percent: 5,
        },
        &tx,
        &cancel_rx,
        |_| {},
    )
    .await
    .unwrap();

    assert_eq!(outcome.bytes, content.len() as u64);
    assert_eq!(outcome.md5_hex, desc.md5_hex);
    let on_disk = tokio::fs::read(&staging).await.unwrap();
    assert_eq!(on_disk, content);
}

#[tokio::test]
async fn checksum_mismatch_deletes_staging_file() {
    let server = MockServer::start();
    let content = b"the server lies about this content".to_vec();
    server.mock(|when, then| {
        when.method(GET).path("/pkg.zip");
        then.status(200).body(&content);
    });

    let temp = tempdir().unwrap();
    let staging = temp.path().join("pkg.zip");
    let (tx, _rx) = channel();
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let mut desc = descriptor(server.url("/pkg.zip"), &content);
    desc.md5_hex = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into();

    let outcome = fetch_package(
        &client(),
        &DownloadRequest {
            descriptor: &desc,
            staging_path: &staging,
            resume_from: 0,
            progress_step_percent: 5,
        },
        &tx,
        &cancel_rx,
        |_| {},
    )
    .await
    .unwrap();

    let err = verify_package(&outcome, &desc, &staging).await.unwrap_err();
    assert!(matches!(
        err,
        otad_errors::Error::Network(otad_errors::NetworkError::ChecksumMismatch { .. })
    ));
    assert!(!staging.exists());
}

#[tokio::test]
async fn server_error_reports_download_failed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/pkg.zip");
        then.status(503);
    });

    let temp = tempdir().unwrap();
    let staging = temp.path().join("pkg.zip");
    let (tx, _rx) = channel();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let desc = descriptor(server.url("/pkg.zip"), b"irrelevant");

    let err = fetch_package(
        &client(),
        &DownloadRequest {
            descriptor: &desc,
            staging_path: &staging,
            resume_from: 0,
            progress_step_percent: 5,
        },
        &tx,
        &cancel_rx,
        |_| {},
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        otad_errors::Error::Network(otad_errors::NetworkError::HttpError { status: 503, .. })
    ));
}

#[tokio::test]
async fn pre_signalled_cancel_stops_before_streaming() {
    let server = MockServer::start();
    let content = vec![0u8; 100_000];
    server.mock(|when, then| {
        when.method(GET).path("/pkg.zip");
        then.status(200).body(&content);
    });

    let temp = tempdir().unwrap();
    let staging = temp.path().join("pkg.zip");
    let (tx, _rx) = channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let desc = descriptor(server.url("/pkg.zip"), &content);
    let err = fetch_package(
        &client(),
        &DownloadRequest {
            descriptor: &desc,
            staging_path: &staging,
            resume_from: 0,
            progress_step_percent: 5,
        },
        &tx,
        &cancel_rx,
        |_| {},
    )
    .await
    .unwrap_err();

    assert!(matches!(err, otad_errors::Error::Cancelled));
}
