//! Unit tests for the signed-URL blob client

use super::*;

use std::sync::Mutex as StdMutex;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn blob_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/container/cache.tzst?sv=2024&sig=secret", server.uri())).unwrap()
}

fn range_options() -> RangeOptions {
    RangeOptions {
        concurrency: 3,
        request_timeout: Duration::from_secs(5),
    }
}

#[test]
fn test_split_range() {
    assert_eq!(
        split_range(10, 10, 4),
        vec![
            ByteRange { start: 10, end: 13 },
            ByteRange { start: 14, end: 17 },
            ByteRange { start: 18, end: 19 },
        ]
    );
    assert!(split_range(0, 0, 4).is_empty());
}

#[test]
fn test_block_ids_have_equal_length() {
    let first = block_id(0);
    let last = block_id(12_345);
    assert_eq!(first.len(), last.len());
    assert_ne!(first, last);
    assert!(block_list_xml(&[first.clone()]).contains(&format!("<Latest>{first}</Latest>")));
}

#[tokio::test]
async fn test_content_length_from_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/container/cache.tzst"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-length", "142"))
        .mount(&server)
        .await;

    let blob = SignedUrlBlobClient::new(blob_url(&server)).unwrap();
    assert_eq!(blob.content_length().await.unwrap(), Some(142));
}

#[tokio::test]
async fn test_missing_blob_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let blob = SignedUrlBlobClient::new(blob_url(&server)).unwrap();
    let err = blob.content_length().await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_download_range_reassembles_parts_in_order() {
    let server = MockServer::start().await;
    let size = (2 * RANGE_REQUEST_SIZE + 1024) as usize;
    let data: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();

    for range in split_range(0, size as u64, RANGE_REQUEST_SIZE) {
        let part = data[range.start as usize..=range.end as usize].to_vec();
        Mock::given(method("GET"))
            .and(header("range", range.range_header().as_str()))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(part))
            .expect(1)
            .mount(&server)
            .await;
    }

    let blob = SignedUrlBlobClient::new(blob_url(&server)).unwrap();
    let seen = StdMutex::new(Vec::new());
    let on_progress = |n: u64| seen.lock().unwrap().push(n);

    let bytes = blob
        .download_range(0, size as u64, &range_options(), &on_progress)
        .await
        .unwrap();

    assert_eq!(bytes.as_ref(), data.as_slice());
    assert_eq!(seen.lock().unwrap().iter().max().copied(), Some(size as u64));
}

#[tokio::test]
async fn test_short_range_is_incomplete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0u8; 5]))
        .mount(&server)
        .await;

    let blob = SignedUrlBlobClient::new(blob_url(&server)).unwrap();
    let err = blob
        .download_range(0, 10, &range_options(), &|_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::IncompleteDownload { expected: 10, actual: 5 }));
}

#[tokio::test]
async fn test_single_shot_upload() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/container/cache.tzst"))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("cache.tzst");
    tokio::fs::write(&file, vec![7u8; 142]).await.unwrap();

    let blob = SignedUrlBlobClient::new(blob_url(&server)).unwrap();
    let sent = StdMutex::new(0u64);
    blob.upload_file(&file, 142, &BlockUploadOptions::default(), &|n| {
        *sent.lock().unwrap() = n;
    })
    .await
    .unwrap();

    assert_eq!(*sent.lock().unwrap(), 142);
}

#[tokio::test]
async fn test_block_upload_commits_block_list() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(query_param("comp", "block"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(query_param("comp", "blocklist"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("cache.tzst");
    tokio::fs::write(&file, vec![1u8; 10]).await.unwrap();

    let options = BlockUploadOptions {
        block_size: 4,
        concurrency: 2,
        single_shot_threshold: 5,
    };
    let blob = SignedUrlBlobClient::new(blob_url(&server)).unwrap();
    let sent = StdMutex::new(0u64);
    blob.upload_file(&file, 10, &options, &|n| {
        let mut total = sent.lock().unwrap();
        *total = (*total).max(n);
    })
    .await
    .unwrap();

    assert_eq!(*sent.lock().unwrap(), 10);
}

#[tokio::test]
async fn test_rejected_upload_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("cache.tgz");
    tokio::fs::write(&file, b"archive").await.unwrap();

    let blob = SignedUrlBlobClient::new(blob_url(&server)).unwrap();
    let err = blob
        .upload_file(&file, 7, &BlockUploadOptions::default(), &|_| {})
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
}
