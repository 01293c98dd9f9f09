use httpmock::prelude::*;
use httpmock::Method::HEAD;
use macfetch_chunklist::{Chunklist, ChunklistBuilder};
use macfetch_errors::{Error, FormatError, IntegrityError, NetworkError, TaskError};
use macfetch_net::{DownloadOptions, DownloaderConfig, NetClient, RetryPolicy, RetryingDownloader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn downloader(retries: u32) -> RetryingDownloader {
    RetryingDownloader::new(
        NetClient::with_defaults().unwrap(),
        RetryPolicy::immediate(retries),
        DownloaderConfig::default(),
    )
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn chunklist_for(data: &[u8], chunk_size: u32) -> Arc<Chunklist> {
    Arc::new(
        ChunklistBuilder::new()
            .chunk_size(chunk_size)
            .build_unsigned(data)
            .unwrap(),
    )
}

#[tokio::test]
async fn downloads_and_verifies_full_payload() {
    let server = MockServer::start_async().await;
    let data = payload(100);
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/image.dmg");
            then.status(200).body(&data);
        })
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("nested/image.dmg");
    let options = DownloadOptions::new().with_chunklist(chunklist_for(&data, 10));

    let task = downloader(2)
        .download(&server.url("/image.dmg"), &dest, &options, &CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(task.verified);
    assert_eq!(task.total_size, 100);
    assert_eq!(task.resumed_from, 0);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), data);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;

    let dir = TempDir::new().unwrap();
    let err = downloader(5)
        .download(
            &server.url("/missing"),
            &dir.path().join("out"),
            &DownloadOptions::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), Some(404));
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn server_errors_exhaust_the_retry_budget() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        })
        .await;

    let dir = TempDir::new().unwrap();
    let err = downloader(2)
        .download(
            &server.url("/flaky"),
            &dir.path().join("out"),
            &DownloadOptions::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), Some(503));
    assert_eq!(mock.hits_async().await, 3);
}

#[tokio::test]
async fn resumes_from_last_verified_chunk() {
    let server = MockServer::start_async().await;
    let data = payload(100);
    let head = server
        .mock_async(|when, then| {
            when.method(HEAD).path("/image.dmg");
            then.status(200).header("Accept-Ranges", "bytes");
        })
        .await;
    let ranged = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/image.dmg")
                .header("Range", "bytes=30-");
            then.status(206)
                .header("Content-Range", "bytes 30-99/100")
                .body(&data[30..]);
        })
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("image.dmg");
    // 35 bytes on disk: three whole chunks and half of the fourth
    tokio::fs::write(&dest, &data[..35]).await.unwrap();

    let options = DownloadOptions::new().with_chunklist(chunklist_for(&data, 10));
    let task = downloader(0)
        .download(&server.url("/image.dmg"), &dest, &options, &CancellationToken::new())
        .await
        .unwrap();

    head.assert_async().await;
    ranged.assert_async().await;
    assert_eq!(task.resumed_from, 30);
    assert_eq!(task.bytes_fetched, 70);
    assert!(task.verified);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), data);
}

#[tokio::test]
async fn complete_verified_file_is_not_fetched_again() {
    let server = MockServer::start_async().await;
    let data = payload(40);
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/image.dmg");
            then.status(200).body(&data);
        })
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("image.dmg");
    tokio::fs::write(&dest, &data).await.unwrap();

    let options = DownloadOptions::new().with_chunklist(chunklist_for(&data, 10));
    let task = downloader(0)
        .download(&server.url("/image.dmg"), &dest, &options, &CancellationToken::new())
        .await
        .unwrap();

    assert!(task.verified);
    assert_eq!(task.bytes_fetched, 0);
    assert_eq!(get.hits_async().await, 0);
}

#[tokio::test]
async fn corrupt_chunk_stops_transfer_and_keeps_verified_prefix() {
    let server = MockServer::start_async().await;
    let data = payload(100);
    let mut served = data.clone();
    served[55] ^= 0xFF;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/image.dmg");
            then.status(200).body(&served);
        })
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("image.dmg");
    let options = DownloadOptions::new()
        .with_chunklist(chunklist_for(&data, 10))
        .with_increment_size(7);

    let err = downloader(3)
        .download(&server.url("/image.dmg"), &dest, &options, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::Integrity(IntegrityError::ChunkMismatch {
            chunk_index,
            offset,
        }) => {
            assert_eq!(chunk_index, 5);
            assert_eq!(offset, 50);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(mock.hits_async().await, 1);
    assert_eq!(tokio::fs::metadata(&dest).await.unwrap().len(), 50);
}

#[tokio::test]
async fn server_size_must_match_chunklist() {
    let server = MockServer::start_async().await;
    let data = payload(100);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/image.dmg");
            then.status(200).body(&data[..90]);
        })
        .await;

    let dir = TempDir::new().unwrap();
    let options = DownloadOptions::new().with_chunklist(chunklist_for(&data, 10));
    let err = downloader(3)
        .download(
            &server.url("/image.dmg"),
            &dir.path().join("image.dmg"),
            &options,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Format(FormatError::SizeMismatch {
            declared: 100,
            actual: 90
        })
    ));
}

#[tokio::test]
async fn cancellation_leaves_no_more_than_reported() {
    let server = MockServer::start_async().await;
    let data = payload(1024 * 1024);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/big.dmg");
            then.status(200).body(&data);
        })
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("big.dmg");
    let cancel = CancellationToken::new();
    let last_reported = Arc::new(AtomicU64::new(0));

    let trigger = cancel.clone();
    let sink = Arc::clone(&last_reported);
    let options = DownloadOptions::new()
        .with_increment_size(4096)
        .with_progress_interval(Duration::ZERO)
        .on_progress(move |progress| {
            sink.store(progress.bytes_transferred, Ordering::SeqCst);
            if progress.bytes_transferred >= 64 * 1024 {
                trigger.cancel();
            }
        });

    let err = downloader(3)
        .download(&server.url("/big.dmg"), &dest, &options, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    let on_disk = tokio::fs::metadata(&dest).await.unwrap().len();
    assert!(on_disk < data.len() as u64);
    assert_eq!(on_disk, last_reported.load(Ordering::SeqCst));
}

#[tokio::test]
async fn busy_destination_is_rejected() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("image.dmg");
    let downloader = downloader(0);
    let _claim = downloader.registry().claim(&dest).unwrap();

    let err = downloader
        .download(
            "https://example.invalid/image.dmg",
            &dest,
            &DownloadOptions::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Task(TaskError::DestinationBusy { .. })));
}

#[tokio::test]
async fn fetch_bytes_enforces_size_cap() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/image.chunklist");
            then.status(200).body(vec![0u8; 64]);
        })
        .await;

    let small = RetryingDownloader::new(
        NetClient::with_defaults().unwrap(),
        RetryPolicy::immediate(0),
        DownloaderConfig {
            max_body_size: 16,
            ..DownloaderConfig::default()
        },
    );
    let err = small
        .fetch_bytes(&server.url("/image.chunklist"), &[], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Network(NetworkError::ResponseTooLarge { limit: 16, .. })
    ));
}

#[tokio::test]
async fn fetch_bytes_sends_asset_cookie() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/image.chunklist")
                .header("Cookie", "AssetToken=abc");
            then.status(200).body(b"CNKL");
        })
        .await;

    let headers = vec![("Cookie".to_string(), "AssetToken=abc".to_string())];
    let body = downloader(0)
        .fetch_bytes(&server.url("/image.chunklist"), &headers, &CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(body, b"CNKL");
}

#[tokio::test]
async fn stored_artifact_keeps_its_path_claimed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("monterey/12/recovery/BaseSystem.chunklist");
    let downloader = downloader(0);

    let claim = downloader.store(&path, b"CNKL").await.unwrap();
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"CNKL");

    let err = downloader.store(&path, b"other").await.unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::DestinationBusy { .. })));
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"CNKL");

    drop(claim);
    let _claim = downloader.store(&path, b"CNKL2").await.unwrap();
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"CNKL2");
}

#[tokio::test]
async fn send_for_body_hands_back_client_errors() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/query");
            then.status(401).body("expired");
        })
        .await;

    let url = server.url("/query");
    let (status, body) = downloader(2)
        .send_for_body(&url, &CancellationToken::new(), |client| {
            client.post(url.as_str()).body("q")
        })
        .await
        .unwrap();

    assert_eq!(status.as_u16(), 401);
    assert_eq!(body, b"expired");
    assert_eq!(mock.hits_async().await, 1);
}
