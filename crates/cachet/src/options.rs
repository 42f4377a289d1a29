//! Per-cache and per-call options

use std::time::Duration;

use cachet_client::{DownloadOptions, UploadOptions};
use cachet_config::CacheSettings;

/// Options fixed for the lifetime of a [`Cache`](crate::Cache)
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Configured archive size cap in bytes
    pub max_archive_size: Option<u64>,
    /// Self-hosted servers enforce their own size limits
    pub self_hosted: bool,
    pub upload: UploadOptions,
    pub download: DownloadOptions,
}

impl CacheOptions {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let mut download = DownloadOptions::default();
        if let Some(use_blob_sdk) = settings.download.use_blob_sdk {
            download.use_blob_sdk = use_blob_sdk;
        }
        if let Some(concurrency) = settings.download.concurrency {
            download.concurrency = concurrency.max(1);
        }
        if let Some(timeout_ms) = settings.download.timeout_ms {
            download.request_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(segment_ms) = settings.segment_timeout_ms() {
            download.segment_timeout = Duration::from_millis(segment_ms);
        }

        Self {
            max_archive_size: settings.archive.max_size,
            self_hosted: settings.is_self_hosted(),
            upload: UploadOptions {
                concurrency: settings.upload_concurrency(),
                chunk_size: settings.upload_chunk_size(),
                ..UploadOptions::default()
            },
            download,
        }
    }
}

/// Options for one restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Report the matched key without downloading
    pub lookup_only: bool,
    /// Match entries saved on other operating systems
    pub cross_os: bool,
}

/// Options for one save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Allow restoring the entry on other operating systems
    pub cross_os: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_feed_transfer_options() {
        let mut settings = CacheSettings::default();
        settings.upload.concurrency = Some(64);
        settings.upload.chunk_size_mb = Some(16);
        settings.download.use_blob_sdk = Some(true);
        settings.download.segment_timeout_mins = Some(2);
        settings.archive.max_size = Some(1024);

        let options = CacheOptions::from_settings(&settings);
        assert_eq!(options.upload.concurrency, Some(32));
        assert_eq!(options.upload.chunk_size, Some(16 * 1024 * 1024));
        assert!(options.download.use_blob_sdk);
        assert_eq!(options.download.segment_timeout, Duration::from_secs(120));
        assert_eq!(options.max_archive_size, Some(1024));
        assert!(!options.self_hosted);
    }
}
