//! Cache service client for cachet
//!
//! This crate talks to the remote cache service. It provides the retry
//! policy, an authenticated HTTP client, the wire types of both protocol
//! generations, the two backends behind one trait, a signed-URL blob client
//! and the chunked/segmented transfer engine.

pub mod api;
pub mod backend;
pub mod blob;
pub mod client;
pub mod retry;
pub mod transfer;

// Re-export main types
pub use backend::{
    CacheBackend, CacheEntry, EntryLocation, Finalization, Reservation, RestBackend, RpcBackend,
    UploadTicket, VersionOptions,
};
pub use blob::{BlobClient, SignedUrlBlobClient};
pub use client::{HttpClient, TypedResponse};
pub use retry::{retry, RetryConfig};
pub use transfer::{
    DownloadOptions, LogProgress, NoProgress, ProgressReporter, UploadOptions,
};

use cachet_core::error::CacheError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, CacheError>;
