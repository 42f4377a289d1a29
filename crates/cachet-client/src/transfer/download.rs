//! Streaming and segmented downloads

use std::io::SeekFrom;
use std::path::Path;

use cachet_core::error::CacheError;
use cachet_core::types::archive::file_size;
use cachet_core::utils::redact_url;
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Response};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::debug;
use url::Url;

use super::{DownloadOptions, ProgressReporter};
use crate::blob::{BlobClient, RangeOptions};
use crate::retry::{is_success_status, retry, RetryConfig};
use crate::ClientResult;

/// Largest segment a single buffer may hold
pub const MAX_SEGMENT_SIZE: u64 = i32::MAX as u64;

/// Stream `url` into `dest`
///
/// The idle timeout bounds the gap between two received chunks, not the
/// whole transfer. A `Content-Length` header, when present, must match the
/// bytes written.
pub async fn download_streaming(
    client: &Client,
    url: &Url,
    dest: &Path,
    options: &DownloadOptions,
) -> ClientResult<()> {
    debug!("Downloading {} to {}", redact_url(url.as_str()), dest.display());

    let response = retry(
        "downloadCache",
        &RetryConfig::default(),
        || async {
            client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| CacheError::network(format!("Failed to download cache: {e}"), e))
        },
        |r: &Response| Some(r.status().as_u16()),
    )
    .await?;

    let status = response.status().as_u16();
    if !is_success_status(Some(status)) {
        return Err(CacheError::Service {
            status,
            context: Some("during cache download.".to_string()),
        });
    }

    let expected = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let reporter = options.reporter();
    reporter.start(expected);
    let result = stream_body(response, dest, options, reporter.as_ref()).await;
    reporter.stop();
    result?;

    match expected {
        Some(expected) => {
            let actual = file_size(dest)?;
            if actual != expected {
                return Err(CacheError::IncompleteDownload { expected, actual });
            }
        },
        None => debug!("Unable to validate download, no Content-Length header"),
    }

    Ok(())
}

async fn stream_body(
    response: Response,
    dest: &Path,
    options: &DownloadOptions,
    reporter: &dyn ProgressReporter,
) -> ClientResult<()> {
    let mut file = File::create(dest)
        .await
        .map_err(|e| CacheError::io(format!("Failed to create {}", dest.display()), e))?;
    let mut stream = response.bytes_stream();
    let mut received = 0u64;

    loop {
        let next = match tokio::time::timeout(options.idle_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                debug!("Aborting download, socket timed out after {:?}", options.idle_timeout);
                return Err(CacheError::Timeout {
                    operation: "Cache download".to_string(),
                    millis: options.idle_timeout.as_millis() as u64,
                });
            },
        };

        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| CacheError::network(format!("Download interrupted: {e}"), e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| CacheError::io(format!("Failed to write {}", dest.display()), e))?;
        received += chunk.len() as u64;
        reporter.on_progress(received);
    }

    file.flush()
        .await
        .map_err(|e| CacheError::io(format!("Failed to write {}", dest.display()), e))
}

/// Download a blob one segment at a time
///
/// Only one segment is held in memory; each segment is fetched with the
/// blob client's own parallelism. When the blob length is unknown the
/// download falls back to streaming.
pub async fn download_segmented(
    http: &Client,
    blob: &dyn BlobClient,
    dest: &Path,
    options: &DownloadOptions,
) -> ClientResult<()> {
    let Some(length) = blob.content_length().await? else {
        debug!("Unable to determine content length, downloading file with http-client...");
        return download_streaming(http, blob.url(), dest, options).await;
    };

    let reporter = options.reporter();
    reporter.start(Some(length));
    let result = write_segments(blob, length, dest, options, reporter.as_ref()).await;
    reporter.stop();
    result
}

async fn write_segments(
    blob: &dyn BlobClient,
    length: u64,
    dest: &Path,
    options: &DownloadOptions,
    reporter: &dyn ProgressReporter,
) -> ClientResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dest)
        .await
        .map_err(|e| CacheError::io(format!("Failed to create {}", dest.display()), e))?;

    let segment_size = options.segment_size.clamp(1, MAX_SEGMENT_SIZE);
    let range_options = RangeOptions {
        concurrency: options.concurrency,
        request_timeout: options.request_timeout,
    };
    let mut offset = 0u64;

    while offset < length {
        let count = std::cmp::min(segment_size, length - offset);
        let segment_start = offset;
        let on_progress = move |loaded: u64| reporter.on_progress(segment_start + loaded);

        let segment = tokio::time::timeout(
            options.segment_timeout,
            blob.download_range(offset, count, &range_options, &on_progress),
        )
        .await
        .map_err(|_| CacheError::Timeout {
            operation: "Aborting cache download as the segment download".to_string(),
            millis: options.segment_timeout.as_millis() as u64,
        })??;

        if segment.len() as u64 != count {
            return Err(CacheError::IncompleteDownload {
                expected: count,
                actual: segment.len() as u64,
            });
        }

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| CacheError::io(format!("Failed to seek {}", dest.display()), e))?;
        file.write_all(&segment)
            .await
            .map_err(|e| CacheError::io(format!("Failed to write {}", dest.display()), e))?;

        offset += count;
        reporter.on_progress(offset);
    }

    file.flush()
        .await
        .map_err(|e| CacheError::io(format!("Failed to write {}", dest.display()), e))
}
