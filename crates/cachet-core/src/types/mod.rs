//! Core data types for cache operations.
//!
//! This module contains the value types shared by the transport client,
//! the backends and the orchestrator.

pub mod archive;
pub mod compression;
pub mod key;

// Re-export main types
pub use archive::ArchiveFile;
pub use compression::CompressionMethod;
pub use key::{CacheKey, MAX_KEYS, MAX_KEY_LENGTH};
