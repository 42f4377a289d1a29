//! Archive creation and path resolution for cachet
//!
//! The orchestrator treats archiving and glob expansion as collaborators
//! behind the [`Archiver`] and [`PathResolver`] traits. This crate provides
//! the default implementations: an in-process tar archiver compressed with
//! gzip or zstd, and a glob resolver rooted at the workspace.

pub mod archiver;
pub mod resolver;
pub mod tarball;

// Re-export main types
pub use archiver::{Archiver, TarArchiver};
pub use resolver::{GlobResolver, PathResolver};
pub use tarball::{create_archive, extract_archive, list_archive};

use cachet_core::error::CacheError;

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, CacheError>;
