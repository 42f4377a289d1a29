//! Configuration for cachet
//!
//! Settings come from three layers: built-in defaults, an optional
//! `cachet.toml`, and the CI runner's environment. This crate also decides
//! which cache service protocol a call talks to.

pub mod merge;
pub mod service;
pub mod toml;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use service::{is_self_hosted, ServiceVersion};
pub use toml::{ArchiveSection, CacheSettings, DownloadSection, ServiceSection, UploadSection};

use cachet_core::error::CacheError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, CacheError>;
