//! Cache backends
//!
//! The orchestrator talks to one [`CacheBackend`] chosen when the cache is
//! built. Misses and reservation conflicts are ordinary return values;
//! only transport and server failures are errors.

pub mod rest;
pub mod rpc;

use std::path::Path;

use async_trait::async_trait;
use cachet_core::types::{ArchiveFile, CacheKey, CompressionMethod};
use cachet_core::version::{compute_version, CacheVersion, VersionScheme};
use url::Url;

pub use rest::RestBackend;
pub use rpc::RpcBackend;

use crate::transfer::{DownloadOptions, UploadOptions};
use crate::ClientResult;

/// Where a matched archive can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryLocation {
    /// v1 archive location
    Archive(Url),
    /// v2 signed blob URL
    SignedDownload(Url),
}

impl EntryLocation {
    pub fn url(&self) -> &Url {
        match self {
            EntryLocation::Archive(url) | EntryLocation::SignedDownload(url) => url,
        }
    }
}

/// Successful lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Primary or restore key reported as matched
    pub matched_key: String,
    pub location: EntryLocation,
    /// Compression the archive was written with
    pub compression: CompressionMethod,
}

/// Write authorization for one save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTicket {
    Rest {
        cache_id: i64,
    },
    Rpc {
        signed_upload_url: Url,
        key: String,
        version: CacheVersion,
    },
}

/// Outcome of a reservation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Reserved(UploadTicket),
    /// Another writer owns this key and version
    Conflict { reason: String },
}

/// Outcome of committing an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    Committed { entry_id: i64 },
    Rejected { reason: String },
}

/// Inputs to the version fingerprint besides the paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionOptions {
    pub compression: CompressionMethod,
    pub cross_os: bool,
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Fingerprint rules of this protocol
    fn scheme(&self) -> VersionScheme;

    fn version(&self, paths: &[String], options: &VersionOptions) -> CacheVersion {
        compute_version(paths, Some(options.compression), options.cross_os, self.scheme())
    }

    /// Find an entry for the first matching key; `None` is a miss
    async fn lookup(
        &self,
        keys: &CacheKey,
        paths: &[String],
        options: &VersionOptions,
    ) -> ClientResult<Option<CacheEntry>>;

    async fn reserve(
        &self,
        key: &str,
        paths: &[String],
        options: &VersionOptions,
    ) -> ClientResult<Reservation>;

    async fn transfer_up(
        &self,
        ticket: &UploadTicket,
        archive: &ArchiveFile,
        options: &UploadOptions,
    ) -> ClientResult<()>;

    async fn transfer_down(
        &self,
        entry: &CacheEntry,
        dest: &Path,
        options: &DownloadOptions,
    ) -> ClientResult<()>;

    async fn finalize(&self, ticket: &UploadTicket, size: u64) -> ClientResult<Finalization>;
}
