//! Restore and save workflows

mod restore;
mod save;


use std::fmt;
use std::path::Path;
use std::sync::Arc;

use cachet_archive::{Archiver, GlobResolver, PathResolver, TarArchiver};
use cachet_client::{CacheBackend, RestBackend, RpcBackend, VersionOptions};
use cachet_config::{CacheSettings, ServiceVersion};
use cachet_core::error::{CacheError, CacheResult};
use cachet_core::types::CompressionMethod;
use tempfile::TempDir;
use tracing::{debug, Level};

use crate::options::CacheOptions;

/// Fixed ceiling for archive size on hosted services
pub const CACHE_SIZE_LIMIT: u64 = 10 * 1024 * 1024 * 1024;

/// Compression used when nothing is configured
const DEFAULT_COMPRESSION: CompressionMethod = CompressionMethod::Zstd;

/// Cache bound to one backend, archiver and resolver
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    archiver: Arc<dyn Archiver>,
    resolver: Arc<dyn PathResolver>,
    options: CacheOptions,
}

impl Cache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        archiver: Arc<dyn Archiver>,
        resolver: Arc<dyn PathResolver>,
    ) -> Self {
        Self {
            backend,
            archiver,
            resolver,
            options: CacheOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the cache the settings describe
    ///
    /// The backend is chosen once here from the service version; the
    /// archiver and resolver are rooted at the configured workspace.
    pub fn from_settings(settings: &CacheSettings) -> CacheResult<Self> {
        let token = settings.service.runtime_token.as_deref();
        let version = settings.service_version();
        let url = settings
            .service_url()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CacheError::ConfigValidation {
                field: match version {
                    ServiceVersion::V1 => "service.cache_url".to_string(),
                    ServiceVersion::V2 => "service.results_url".to_string(),
                },
                reason: "Cache Service Url not found, unable to restore cache.".to_string(),
            })?;

        let backend: Arc<dyn CacheBackend> = match version {
            ServiceVersion::V1 => Arc::new(RestBackend::new(url, token)?),
            ServiceVersion::V2 => Arc::new(RpcBackend::new(url, token)?),
        };

        let workspace = match &settings.archive.workspace {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| CacheError::io("Failed to read working directory".to_string(), e))?,
        };
        let compression = settings.archive.compression.unwrap_or(DEFAULT_COMPRESSION);
        debug!(
            "Cache service {} with {} compression in {}",
            version,
            compression,
            workspace.display()
        );

        Ok(Self::new(
            backend,
            Arc::new(TarArchiver::new(&workspace, compression)),
            Arc::new(GlobResolver::new(workspace)),
        )
        .with_options(CacheOptions::from_settings(settings)))
    }

    /// Whether the configured cache service can be reached at all
    pub fn is_feature_available(settings: &CacheSettings) -> bool {
        settings.is_feature_available()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Size cap applied before upload, if any
    pub fn enforced_size_limit(&self) -> Option<u64> {
        if self.options.self_hosted {
            return self.options.max_archive_size;
        }
        Some(
            self.options
                .max_archive_size
                .map_or(CACHE_SIZE_LIMIT, |max| max.min(CACHE_SIZE_LIMIT)),
        )
    }

    fn version_options(&self, cross_os: bool) -> VersionOptions {
        VersionOptions {
            compression: self.archiver.compression(),
            cross_os,
        }
    }

    /// List archive members when debug logging is on
    async fn log_archive_members(&self, archive: &Path, method: CompressionMethod) {
        if !tracing::enabled!(Level::DEBUG) {
            return;
        }
        match self.archiver.list_archive(archive, method).await {
            Ok(members) => {
                for member in members {
                    debug!("{}", member.display());
                }
            },
            Err(e) => debug!("Failed to list archive: {}", e),
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.name())
            .field("compression", &self.archiver.compression())
            .field("options", &self.options)
            .finish()
    }
}

/// Scratch directory for one archive
fn scratch_dir() -> CacheResult<TempDir> {
    tempfile::Builder::new()
        .prefix("cachet-")
        .tempdir()
        .map_err(|e| CacheError::io("Failed to create scratch directory".to_string(), e))
}

/// Best-effort removal of a local archive
fn remove_archive(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!("Failed to delete archive {}: {}", path.display(), e);
    }
}
