//! Blob storage access through signed URLs
//!
//! Signed URLs carry their own authorization, so this client sends no
//! bearer token. Range downloads fan out over parallel sub-requests and
//! large uploads are staged as blocks and committed with a block list.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::{Bytes, BytesMut};
use cachet_core::error::CacheError;
use cachet_core::utils::redact_url;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Client, ClientBuilder, Response};
use tracing::debug;
use url::Url;

use crate::retry::{is_success_status, retry, RetryConfig};
use crate::transfer::upload::{upload_chunks, ByteRange};
use crate::transfer::{
    NoProgress, DEFAULT_BLOCK_CONCURRENCY, DEFAULT_BLOCK_SIZE, DEFAULT_SINGLE_SHOT_THRESHOLD,
};
use crate::ClientResult;

/// Size of one ranged sub-request inside a segment
pub const RANGE_REQUEST_SIZE: u64 = 4 * 1024 * 1024;

const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";

/// Options for a ranged download
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOptions {
    pub concurrency: usize,
    pub request_timeout: Duration,
}

/// Options for a file upload
#[derive(Debug, Clone, PartialEq)]
pub struct BlockUploadOptions {
    pub block_size: u64,
    pub concurrency: usize,
    /// Files up to this size are sent in one request
    pub single_shot_threshold: u64,
}

impl Default for BlockUploadOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            concurrency: DEFAULT_BLOCK_CONCURRENCY,
            single_shot_threshold: DEFAULT_SINGLE_SHOT_THRESHOLD,
        }
    }
}

/// Blob storage operations used by the transfer engine
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Blob URL, including its signature
    fn url(&self) -> &Url;

    /// Blob length, `None` when the service does not report it
    async fn content_length(&self) -> ClientResult<Option<u64>>;

    /// Read `count` bytes starting at `offset`
    ///
    /// `on_progress` receives bytes received within this range so far.
    async fn download_range(
        &self,
        offset: u64,
        count: u64,
        options: &RangeOptions,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> ClientResult<Bytes>;

    /// Upload a whole file; `on_progress` receives cumulative bytes sent
    async fn upload_file(
        &self,
        path: &Path,
        size: u64,
        options: &BlockUploadOptions,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> ClientResult<()>;
}

/// Blob client over a pre-signed URL
#[derive(Debug, Clone)]
pub struct SignedUrlBlobClient {
    client: Client,
    url: Url,
    retry: RetryConfig,
}

impl SignedUrlBlobClient {
    pub fn new(url: Url) -> ClientResult<Self> {
        Ok(Self::with_client(storage_http_client()?, url))
    }

    /// Reuse an existing connection pool
    pub fn with_client(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            retry: RetryConfig::default().with_max_attempts(3),
        }
    }

    fn block_url(&self, block_id: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", block_id);
        url
    }

    fn block_list_url(&self) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("comp", "blocklist");
        url
    }

    async fn fetch_range(&self, range: ByteRange, timeout: Duration) -> ClientResult<Bytes> {
        let response = retry(
            "downloadRange",
            &self.retry,
            || async {
                let request = self
                    .client
                    .get(self.url.clone())
                    .header(RANGE, range.range_header())
                    .send();
                match tokio::time::timeout(timeout, request).await {
                    Ok(result) => result.map_err(|e| {
                        CacheError::network(format!("Range request failed: {e}"), e)
                    }),
                    Err(_) => Err(CacheError::Timeout {
                        operation: "Range request".to_string(),
                        millis: timeout.as_millis() as u64,
                    }),
                }
            },
            |r: &Response| Some(r.status().as_u16()),
        )
        .await?;

        ensure_success(&response, "during range download.")?;

        let body = match tokio::time::timeout(timeout, response.bytes()).await {
            Ok(body) => body.map_err(|e| CacheError::network(format!("Range read failed: {e}"), e))?,
            Err(_) => {
                return Err(CacheError::Timeout {
                    operation: "Range read".to_string(),
                    millis: timeout.as_millis() as u64,
                })
            },
        };

        if body.len() as u64 != range.size() {
            return Err(CacheError::IncompleteDownload {
                expected: range.size(),
                actual: body.len() as u64,
            });
        }
        Ok(body)
    }

    async fn put(&self, url: Url, body: Bytes, blob_type: bool, operation: &str) -> ClientResult<()> {
        let response = retry(
            operation,
            &self.retry,
            || async {
                let mut request = self
                    .client
                    .put(url.clone())
                    .header(CONTENT_LENGTH, body.len())
                    .body(body.clone());
                if blob_type {
                    request = request.header(BLOB_TYPE_HEADER, "BlockBlob");
                }
                request
                    .send()
                    .await
                    .map_err(|e| CacheError::network(format!("{operation} failed: {e}"), e))
            },
            |r: &Response| Some(r.status().as_u16()),
        )
        .await?;

        ensure_success(&response, &format!("during {operation}."))
    }

    async fn upload_blocks(
        &self,
        path: &Path,
        size: u64,
        options: &BlockUploadOptions,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> ClientResult<()> {
        let block_size = options.block_size.max(1);
        let block_count = size.div_ceil(block_size);
        let sent = AtomicU64::new(0);

        upload_chunks(
            path,
            size,
            block_size,
            options.concurrency,
            &NoProgress,
            |range, chunk| {
                let index = range.start / block_size;
                let id = block_id(index);
                let sent = &sent;
                async move {
                    self.put(self.block_url(&id), chunk, false, "stageBlock").await?;
                    on_progress(sent.fetch_add(range.size(), Ordering::SeqCst) + range.size());
                    Ok(())
                }
            },
        )
        .await?;

        debug!("Committing {} blocks", block_count);
        let ids: Vec<String> = (0..block_count).map(block_id).collect();
        let response = retry(
            "commitBlockList",
            &self.retry,
            || async {
                self.client
                    .put(self.block_list_url())
                    .header(CONTENT_TYPE, "application/xml")
                    .body(block_list_xml(&ids))
                    .send()
                    .await
                    .map_err(|e| CacheError::network(format!("commitBlockList failed: {e}"), e))
            },
            |r: &Response| Some(r.status().as_u16()),
        )
        .await?;
        ensure_success(&response, "during commitBlockList.")
    }
}

#[async_trait]
impl BlobClient for SignedUrlBlobClient {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn content_length(&self) -> ClientResult<Option<u64>> {
        let response = retry(
            "getBlobProperties",
            &self.retry,
            || async {
                self.client
                    .head(self.url.clone())
                    .send()
                    .await
                    .map_err(|e| CacheError::network(format!("getBlobProperties failed: {e}"), e))
            },
            |r: &Response| Some(r.status().as_u16()),
        )
        .await?;

        ensure_success(&response, "during getBlobProperties.")?;
        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok()))
    }

    async fn download_range(
        &self,
        offset: u64,
        count: u64,
        options: &RangeOptions,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> ClientResult<Bytes> {
        let ranges = split_range(offset, count, RANGE_REQUEST_SIZE);
        let received = AtomicU64::new(0);
        let timeout = options.request_timeout;

        let parts: Vec<Bytes> = stream::iter(ranges)
            .map(|range| {
                let received = &received;
                async move {
                    let part = self.fetch_range(range, timeout).await?;
                    on_progress(received.fetch_add(part.len() as u64, Ordering::SeqCst) + part.len() as u64);
                    Ok::<_, CacheError>(part)
                }
            })
            .buffered(options.concurrency.max(1))
            .try_collect()
            .await?;

        let mut buffer = BytesMut::with_capacity(count as usize);
        for part in parts {
            buffer.extend_from_slice(&part);
        }
        Ok(buffer.freeze())
    }

    async fn upload_file(
        &self,
        path: &Path,
        size: u64,
        options: &BlockUploadOptions,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> ClientResult<()> {
        debug!("Uploading {} bytes to {}", size, redact_url(self.url.as_str()));

        if size <= options.single_shot_threshold {
            let body = tokio::fs::read(path)
                .await
                .map_err(|e| CacheError::io(format!("Failed to read {}", path.display()), e))?;
            self.put(self.url.clone(), Bytes::from(body), true, "uploadBlob")
                .await?;
            on_progress(size);
            return Ok(());
        }

        self.upload_blocks(path, size, options, on_progress).await
    }
}

/// HTTP client for blob storage: no auth, bodies kept as stored
pub fn storage_http_client() -> ClientResult<Client> {
    ClientBuilder::new()
        .no_gzip()
        .connect_timeout(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("cachet/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CacheError::network(format!("Failed to create HTTP client: {e}"), e))
}

/// Split `[offset, offset + count)` into inclusive ranges of at most `size` bytes
pub fn split_range(offset: u64, count: u64, size: u64) -> Vec<ByteRange> {
    let size = size.max(1);
    let end = offset + count;
    let mut ranges = Vec::new();
    let mut start = offset;
    while start < end {
        let stop = std::cmp::min(start + size, end);
        ranges.push(ByteRange {
            start,
            end: stop - 1,
        });
        start = stop;
    }
    ranges
}

/// Block ids must share one length within a blob
fn block_id(index: u64) -> String {
    general_purpose::STANDARD.encode(format!("block-{index:08}"))
}

fn block_list_xml(ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

fn ensure_success(response: &Response, context: &str) -> ClientResult<()> {
    let status = response.status();
    if is_success_status(Some(status.as_u16())) {
        return Ok(());
    }
    debug!("Blob storage returned {} for {}", status, redact_url(response.url().as_str()));
    Err(CacheError::Service {
        status: status.as_u16(),
        context: Some(context.to_string()),
    })
}

#[cfg(test)]
mod tests;
