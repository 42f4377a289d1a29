//! REST artifact cache protocol (v1)

use std::path::Path;

use async_trait::async_trait;
use cachet_core::error::CacheError;
use cachet_core::types::{ArchiveFile, CacheKey, CompressionMethod};
use cachet_core::utils::redact_url;
use cachet_core::version::{CacheVersion, Platform, VersionScheme};
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Client, Method};
use tracing::{debug, info};
use url::Url;

use super::{
    CacheBackend, CacheEntry, EntryLocation, Finalization, Reservation, UploadTicket,
    VersionOptions,
};
use crate::api::{ArtifactCacheEntry, CommitCacheRequest, ReserveCacheRequest, ReserveCacheResponse};
use crate::blob::{storage_http_client, SignedUrlBlobClient};
use crate::client::{HttpClient, TypedResponse};
use crate::retry::{is_success_status, retry, retry_typed, RetryConfig};
use crate::transfer::{
    download_segmented, download_streaming, upload_chunks, DownloadOptions, UploadOptions,
    DEFAULT_CHUNK_SIZE, DEFAULT_UPLOAD_CONCURRENCY,
};
use crate::ClientResult;

const API_PATH: &str = "_apis/artifactcache/";
const ACCEPT: &str = "application/json;api-version=6.0-preview.1";
const BLOB_HOST_SUFFIX: &str = ".blob.core.windows.net";

/// Client for the reserve/upload/commit protocol
#[derive(Debug, Clone)]
pub struct RestBackend {
    http: HttpClient,
    storage: Client,
    retry: RetryConfig,
    platform: Platform,
}

impl RestBackend {
    /// `cache_url` is the service root; the artifact cache API lives beneath it
    pub fn new(cache_url: &str, token: Option<&str>) -> ClientResult<Self> {
        let root = crate::client::normalize_base_url(cache_url)?;
        let base = root
            .join(API_PATH)
            .map_err(|e| CacheError::validation(format!("Invalid cache URL {cache_url}: {e}")))?;

        Ok(Self {
            http: HttpClient::new(base.as_str(), token, Some(ACCEPT))?,
            storage: storage_http_client()?,
            retry: RetryConfig::service_call(),
            platform: Platform::current(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override the platform used for fingerprints and the gzip fallback
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    fn version_for(&self, paths: &[String], options: &VersionOptions) -> CacheVersion {
        cachet_core::version::Fingerprint::new(paths)
            .compression(Some(options.compression))
            .cross_os(options.cross_os)
            .scheme(VersionScheme::Rest)
            .platform(self.platform)
            .compute()
    }

    async fn get_entry(
        &self,
        keys: &CacheKey,
        version: &CacheVersion,
    ) -> ClientResult<Option<ArtifactCacheEntry>> {
        let mut url = self.http.url("cache")?;
        url.query_pairs_mut()
            .append_pair("keys", &keys.all().join(","))
            .append_pair("version", version.as_str());

        let response: TypedResponse<ArtifactCacheEntry> =
            retry_typed("getCacheEntry", &self.retry, || self.http.get_json(url.clone())).await?;

        if response.status == 204 {
            debug!("No cache entry for version {} of keys {}", version, keys.all().join(","));
            return Ok(None);
        }
        if !response.is_success() {
            return Err(CacheError::Service {
                status: response.status,
                context: response.message,
            });
        }

        match response.result {
            Some(entry) if entry.archive_location.is_some() => Ok(Some(entry)),
            _ => Err(CacheError::InvalidResponse {
                message: "Cache not found.".to_string(),
            }),
        }
    }

    fn cache_resource(&self, cache_id: i64) -> ClientResult<Url> {
        self.http.url(&format!("caches/{cache_id}"))
    }

    async fn upload_chunk(&self, url: &Url, content_range: String, chunk: bytes::Bytes) -> ClientResult<()> {
        let response = retry(
            "uploadChunk",
            &RetryConfig::chunk_upload(),
            || async {
                let request = self
                    .http
                    .request(Method::PATCH, url.clone())
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .header(CONTENT_RANGE, content_range.as_str())
                    .body(chunk.clone());
                self.http.send_raw(request).await
            },
            |r: &reqwest::Response| Some(r.status().as_u16()),
        )
        .await?;

        let status = response.status().as_u16();
        if !is_success_status(Some(status)) {
            return Err(CacheError::Service {
                status,
                context: Some("during upload chunk.".to_string()),
            });
        }
        Ok(())
    }
}

fn is_blob_storage(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|host| host.to_ascii_lowercase().ends_with(BLOB_HOST_SUFFIX))
}

#[async_trait]
impl CacheBackend for RestBackend {
    fn name(&self) -> &'static str {
        "v1"
    }

    fn scheme(&self) -> VersionScheme {
        VersionScheme::Rest
    }

    fn version(&self, paths: &[String], options: &VersionOptions) -> CacheVersion {
        self.version_for(paths, options)
    }

    async fn lookup(
        &self,
        keys: &CacheKey,
        paths: &[String],
        options: &VersionOptions,
    ) -> ClientResult<Option<CacheEntry>> {
        let mut compression = options.compression;
        let mut entry = self.get_entry(keys, &self.version_for(paths, options)).await?;

        // Entries written by older clients on Windows were always gzip
        if entry.is_none() && self.platform == Platform::Windows && !compression.is_gzip() {
            let fallback = VersionOptions {
                compression: CompressionMethod::Gzip,
                ..*options
            };
            entry = self.get_entry(keys, &self.version_for(paths, &fallback)).await?;
            if entry.is_some() {
                info!(
                    "Couldn't find cache entry with {} compression, falling back to gzip compression.",
                    compression
                );
                compression = CompressionMethod::Gzip;
            }
        }

        let Some(entry) = entry else {
            return Ok(None);
        };
        let location = entry.archive_location.unwrap_or_default();
        let url = Url::parse(&location).map_err(|e| CacheError::InvalidResponse {
            message: format!("Invalid archive location: {e}"),
        })?;
        debug!("Archive location: {}", redact_url(url.as_str()));

        Ok(Some(CacheEntry {
            matched_key: entry.cache_key.unwrap_or_else(|| keys.primary().to_string()),
            location: EntryLocation::Archive(url),
            compression,
        }))
    }

    async fn reserve(
        &self,
        key: &str,
        paths: &[String],
        options: &VersionOptions,
    ) -> ClientResult<Reservation> {
        let version = self.version_for(paths, options);
        let body = ReserveCacheRequest {
            key,
            version: version.as_str(),
            cache_size: None,
        };
        let url = self.http.url("caches")?;

        let response: TypedResponse<ReserveCacheResponse> =
            retry_typed("reserveCache", &self.retry, || self.http.post_json(url.clone(), &body))
                .await?;

        if response.status == 400 {
            let reason = response
                .message
                .unwrap_or_else(|| "Cache size is over the data cap limit, not saving cache.".to_string());
            return Ok(Reservation::Conflict { reason });
        }

        match response.result {
            Some(ReserveCacheResponse { cache_id }) if response.status < 300 && cache_id >= 0 => {
                debug!("Cache ID: {}", cache_id);
                Ok(Reservation::Reserved(UploadTicket::Rest { cache_id }))
            },
            _ => {
                let mut reason = format!(
                    "Unable to reserve cache with key {key}, another job may be creating this cache."
                );
                if let Some(details) = response.message {
                    reason.push_str(&format!(" More details: {details}"));
                }
                Ok(Reservation::Conflict { reason })
            },
        }
    }

    async fn transfer_up(
        &self,
        ticket: &UploadTicket,
        archive: &ArchiveFile,
        options: &UploadOptions,
    ) -> ClientResult<()> {
        let UploadTicket::Rest { cache_id } = ticket else {
            return Err(CacheError::validation("Upload ticket was not issued by the v1 service"));
        };
        let url = self.cache_resource(*cache_id)?;
        let concurrency = options.concurrency_or(DEFAULT_UPLOAD_CONCURRENCY);
        let chunk_size = options.chunk_size_or(DEFAULT_CHUNK_SIZE);
        let reporter = options.reporter();

        debug!(
            "Upload cache {} ({} B) with concurrency {} and chunk size {}",
            cache_id, archive.size, concurrency, chunk_size
        );
        upload_chunks(
            &archive.path,
            archive.size,
            chunk_size,
            concurrency,
            reporter.as_ref(),
            |range, chunk| self.upload_chunk(&url, range.content_range(), chunk),
        )
        .await
    }

    async fn transfer_down(
        &self,
        entry: &CacheEntry,
        dest: &Path,
        options: &DownloadOptions,
    ) -> ClientResult<()> {
        let url = entry.location.url();
        if options.use_blob_sdk && is_blob_storage(url) {
            let blob = SignedUrlBlobClient::with_client(self.storage.clone(), url.clone());
            download_segmented(&self.storage, &blob, dest, options).await
        } else {
            download_streaming(&self.storage, url, dest, options).await
        }
    }

    async fn finalize(&self, ticket: &UploadTicket, size: u64) -> ClientResult<Finalization> {
        let UploadTicket::Rest { cache_id } = ticket else {
            return Err(CacheError::validation("Upload ticket was not issued by the v1 service"));
        };
        let url = self.cache_resource(*cache_id)?;
        let body = CommitCacheRequest { size };

        debug!("Committing cache {} of {} B", cache_id, size);
        let response: TypedResponse<serde_json::Value> =
            retry_typed("commitCache", &self.retry, || self.http.patch_json(url.clone(), &body))
                .await?;

        if !response.is_success() {
            return Ok(Finalization::Rejected {
                reason: format!(
                    "Cache service responded with {} during commit cache.",
                    response.status
                ),
            });
        }

        Ok(Finalization::Committed {
            entry_id: *cache_id,
        })
    }
}
