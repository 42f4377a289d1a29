//! # cachet-core
//!
//! Core types and utilities shared across all cachet crates.
//!
//! This crate provides:
//! - `CacheKey` validation and `CompressionMethod` tokens
//! - Cache version fingerprinting (`version`)
//! - `CacheError` for unified error handling
//! - Hashing, path and URL redaction helpers
//!
//! ## Architecture
//!
//! - `types`: value types passed between the client and the orchestrator
//! - `version`: the pure version fingerprint
//! - `error`: error types and result aliases
//! - `utils`: utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;
pub mod version;

// Re-export commonly used types
pub use error::{CacheError, CacheResult};
pub use types::{ArchiveFile, CacheKey, CompressionMethod};
pub use version::{compute_version, CacheVersion, Fingerprint, Platform, VersionScheme};
