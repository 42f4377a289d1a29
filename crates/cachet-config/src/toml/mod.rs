//! cachet.toml settings parsing

use std::path::PathBuf;

use cachet_core::error::CacheError;
use cachet_core::types::CompressionMethod;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::ConfigResult;

/// Upload concurrency ceiling for environment overrides
pub const MAX_UPLOAD_CONCURRENCY: usize = 32;

/// Upload chunk size ceiling for environment overrides, in MiB
pub const MAX_UPLOAD_CHUNK_MB: u64 = 128;

/// Complete cache settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache service endpoints and credentials
    pub service: ServiceSection,

    /// Upload tuning
    pub upload: UploadSection,

    /// Download tuning
    pub download: DownloadSection,

    /// Archive creation
    pub archive: ArchiveSection,
}

/// Cache service endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Base URL of the REST cache service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_url: Option<String>,

    /// Base URL of the RPC results service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_url: Option<String>,

    /// Bearer token; only ever read from the environment
    #[serde(skip)]
    pub runtime_token: Option<String>,

    /// Use the RPC protocol when the server allows it
    pub service_v2: bool,

    /// Hosting server URL, used to detect self-hosted installations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

/// Upload settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSection {
    /// Parallel chunk/block uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Chunk/block size in MiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size_mb: Option<u64>,
}

/// Download settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    /// Route blob-storage archive URLs through the segmented downloader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_blob_sdk: Option<bool>,

    /// Parallel range requests inside one segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-request timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Budget for a whole segment, in minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_timeout_mins: Option<u64>,
}

/// Archive settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSection {
    /// Root that cached paths are archived relative to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    /// Compression method for new archives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionMethod>,

    /// Size cap in bytes, applied on top of the fixed ceiling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
}

impl CacheSettings {
    /// Upload concurrency, clamped to the allowed range
    pub fn upload_concurrency(&self) -> Option<usize> {
        self.upload
            .concurrency
            .map(|c| c.clamp(1, MAX_UPLOAD_CONCURRENCY))
    }

    /// Upload chunk size in bytes, clamped to the allowed range
    pub fn upload_chunk_size(&self) -> Option<u64> {
        self.upload
            .chunk_size_mb
            .map(|mb| mb.clamp(1, MAX_UPLOAD_CHUNK_MB) * 1024 * 1024)
    }

    /// Segment timeout in milliseconds
    pub fn segment_timeout_ms(&self) -> Option<u64> {
        self.download.segment_timeout_mins.map(|m| m * 60 * 1000)
    }
}

/// Parse settings from TOML text
pub fn parse(content: &str) -> ConfigResult<CacheSettings> {
    ::toml::from_str(content).map_err(|e| CacheError::ConfigValidation {
        field: "cachet.toml".to_string(),
        reason: e.to_string(),
    })
}

/// Load settings from a file
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<CacheSettings> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CacheError::io(format!("Failed to read {path}"), e))?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let settings = parse(
            r#"
[service]
cache_url = "https://cache.example.com/"
service_v2 = true

[upload]
concurrency = 8
chunk_size_mb = 16

[download]
use_blob_sdk = true
segment_timeout_mins = 5

[archive]
compression = "zstd-without-long"
max_size = 1048576
"#,
        )
        .unwrap();

        assert_eq!(settings.service.cache_url.as_deref(), Some("https://cache.example.com/"));
        assert!(settings.service.service_v2);
        assert_eq!(settings.upload_concurrency(), Some(8));
        assert_eq!(settings.upload_chunk_size(), Some(16 * 1024 * 1024));
        assert_eq!(settings.segment_timeout_ms(), Some(300_000));
        assert_eq!(settings.archive.compression, Some(CompressionMethod::ZstdWithoutLong));
        assert_eq!(settings.archive.max_size, Some(1_048_576));
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(parse("").unwrap(), CacheSettings::default());
    }

    #[test]
    fn test_limits_are_clamped() {
        let mut settings = CacheSettings::default();
        settings.upload.concurrency = Some(500);
        settings.upload.chunk_size_mb = Some(1024);
        assert_eq!(settings.upload_concurrency(), Some(32));
        assert_eq!(settings.upload_chunk_size(), Some(128 * 1024 * 1024));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("cachet.toml")).unwrap();
        std::fs::write(&path, "[upload]\nconcurrency = 2\n").unwrap();

        let settings = tokio_test::block_on(load_from_file(&path)).unwrap();
        assert_eq!(settings.upload_concurrency(), Some(2));

        let missing = tokio_test::block_on(load_from_file(&path.with_file_name("absent.toml")));
        assert!(matches!(missing, Err(CacheError::Io { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        let err = parse("[upload]\nconcurrency = \"many\"").unwrap_err();
        assert!(matches!(err, CacheError::ConfigValidation { .. }));
    }
}
