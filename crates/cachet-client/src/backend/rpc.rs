//! Signed-URL RPC protocol (v2)

use std::path::Path;

use async_trait::async_trait;
use cachet_core::error::CacheError;
use cachet_core::types::{ArchiveFile, CacheKey};
use cachet_core::utils::redact_url;
use cachet_core::version::VersionScheme;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::{
    CacheBackend, CacheEntry, EntryLocation, Finalization, Reservation, UploadTicket,
    VersionOptions,
};
use crate::api::{
    CreateCacheEntryRequest, CreateCacheEntryResponse, FinalizeCacheEntryUploadRequest,
    FinalizeCacheEntryUploadResponse, GetCacheEntryDownloadUrlRequest,
    GetCacheEntryDownloadUrlResponse, CACHE_SERVICE,
};
use crate::blob::{storage_http_client, BlockUploadOptions, SignedUrlBlobClient};
use crate::client::{HttpClient, TypedResponse};
use crate::retry::{retry_typed, RetryConfig};
use crate::transfer::{
    download_segmented, upload_to_blob, DownloadOptions, UploadOptions, DEFAULT_BLOCK_CONCURRENCY,
    DEFAULT_BLOCK_SIZE,
};
use crate::ClientResult;

/// Client for the results service cache RPCs
#[derive(Debug, Clone)]
pub struct RpcBackend {
    http: HttpClient,
    storage: Client,
    retry: RetryConfig,
}

impl RpcBackend {
    pub fn new(results_url: &str, token: Option<&str>) -> ClientResult<Self> {
        Ok(Self {
            http: HttpClient::new(results_url, token, None)?,
            storage: storage_http_client()?,
            retry: RetryConfig::service_call(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Invoke one RPC method; a non-success status is an error
    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> ClientResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Default,
    {
        let url = self.http.url(&format!("{CACHE_SERVICE}/{method}"))?;
        let response: TypedResponse<Resp> =
            retry_typed(method, &self.retry, || self.http.post_json(url.clone(), request)).await?;

        if !response.is_success() {
            return Err(CacheError::Service {
                status: response.status,
                context: response.message.map(|m| format!("calling {method}: {m}")),
            });
        }
        Ok(response.result.unwrap_or_default())
    }
}

fn parse_signed_url(raw: &str) -> ClientResult<Url> {
    Url::parse(raw).map_err(|e| CacheError::InvalidResponse {
        message: format!("Invalid signed URL: {e}"),
    })
}

#[async_trait]
impl CacheBackend for RpcBackend {
    fn name(&self) -> &'static str {
        "v2"
    }

    fn scheme(&self) -> VersionScheme {
        VersionScheme::Rpc
    }

    async fn lookup(
        &self,
        keys: &CacheKey,
        paths: &[String],
        options: &VersionOptions,
    ) -> ClientResult<Option<CacheEntry>> {
        let version = self.version(paths, options);
        let request = GetCacheEntryDownloadUrlRequest {
            key: keys.primary(),
            restore_keys: keys.restore_keys(),
            version: version.as_str(),
        };

        let response: GetCacheEntryDownloadUrlResponse =
            self.call("GetCacheEntryDownloadURL", &request).await?;
        if !response.ok {
            debug!(
                "Cache not found for version {} of keys: {}",
                version,
                keys.all().join(", ")
            );
            return Ok(None);
        }

        let url = parse_signed_url(&response.signed_download_url)?;
        debug!("Signed download URL: {}", redact_url(url.as_str()));

        let matched_key = if response.matched_key.is_empty() {
            keys.primary().to_string()
        } else {
            response.matched_key
        };

        Ok(Some(CacheEntry {
            matched_key,
            location: EntryLocation::SignedDownload(url),
            compression: options.compression,
        }))
    }

    async fn reserve(
        &self,
        key: &str,
        paths: &[String],
        options: &VersionOptions,
    ) -> ClientResult<Reservation> {
        let version = self.version(paths, options);
        let request = CreateCacheEntryRequest {
            key,
            version: version.as_str(),
        };

        let response: CreateCacheEntryResponse = self.call("CreateCacheEntry", &request).await?;
        if !response.ok || response.signed_upload_url.is_empty() {
            if !response.message.is_empty() {
                warn!("Cache reservation failed: {}", response.message);
            }
            return Ok(Reservation::Conflict {
                reason: format!(
                    "Unable to reserve cache with key {key}, another job may be creating this cache."
                ),
            });
        }

        let signed_upload_url = parse_signed_url(&response.signed_upload_url)?;
        debug!("Signed upload URL: {}", redact_url(signed_upload_url.as_str()));

        Ok(Reservation::Reserved(UploadTicket::Rpc {
            signed_upload_url,
            key: key.to_string(),
            version,
        }))
    }

    async fn transfer_up(
        &self,
        ticket: &UploadTicket,
        archive: &ArchiveFile,
        options: &UploadOptions,
    ) -> ClientResult<()> {
        let UploadTicket::Rpc {
            signed_upload_url, ..
        } = ticket
        else {
            return Err(CacheError::validation("Upload ticket was not issued by the v2 service"));
        };

        let blob = SignedUrlBlobClient::with_client(self.storage.clone(), signed_upload_url.clone());
        let block_options = BlockUploadOptions {
            block_size: options.chunk_size_or(DEFAULT_BLOCK_SIZE),
            concurrency: options.concurrency_or(DEFAULT_BLOCK_CONCURRENCY),
            single_shot_threshold: options.single_shot_threshold(),
        };
        let reporter = options.reporter();

        upload_to_blob(&blob, archive, &block_options, reporter.as_ref()).await
    }

    async fn transfer_down(
        &self,
        entry: &CacheEntry,
        dest: &Path,
        options: &DownloadOptions,
    ) -> ClientResult<()> {
        let url = entry.location.url();
        let blob = SignedUrlBlobClient::with_client(self.storage.clone(), url.clone());
        download_segmented(&self.storage, &blob, dest, options).await
    }

    async fn finalize(&self, ticket: &UploadTicket, size: u64) -> ClientResult<Finalization> {
        let UploadTicket::Rpc { key, version, .. } = ticket else {
            return Err(CacheError::validation("Upload ticket was not issued by the v2 service"));
        };
        let request = FinalizeCacheEntryUploadRequest {
            key,
            version: version.as_str(),
            size_bytes: i64::try_from(size).map_err(|_| CacheError::validation("Archive size overflows"))?,
        };

        let response: FinalizeCacheEntryUploadResponse =
            self.call("FinalizeCacheEntryUpload", &request).await?;
        if !response.ok {
            let reason = if response.message.is_empty() {
                format!("Unable to finalize cache with key {key}, another job may be finalizing this cache.")
            } else {
                response.message
            };
            return Ok(Finalization::Rejected { reason });
        }

        debug!("Cache entry {} finalized", response.entry_id);
        Ok(Finalization::Committed {
            entry_id: response.entry_id,
        })
    }
}
