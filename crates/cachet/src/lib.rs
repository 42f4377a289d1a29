//! # cachet
//!
//! Restore and save build caches against a remote cache service.
//!
//! [`Cache`] ties a protocol backend, an archiver and a path resolver
//! together and runs the two workflows. Both are best effort: service and
//! transfer failures are logged and turned into a miss or an unsaved
//! outcome, while invalid keys and paths are reported to the caller.
//!
//! ```no_run
//! # async fn run() -> cachet_core::CacheResult<()> {
//! use cachet::{Cache, RestoreOptions};
//! use cachet_config::ConfigLoader;
//!
//! let (settings, _) = ConfigLoader::new(".".into()).load().await?;
//! let cache = Cache::from_settings(&settings)?;
//! let paths = vec!["node_modules".to_string()];
//! let matched = cache
//!     .restore_cache(&paths, "node-abc", &["node-".to_string()], &RestoreOptions::default())
//!     .await?;
//! # let _ = matched;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod options;
pub mod outcome;

// Re-export main types
pub use cache::{Cache, CACHE_SIZE_LIMIT};
pub use options::{CacheOptions, RestoreOptions, SaveOptions};
pub use outcome::SaveOutcome;

pub use cachet_archive::{Archiver, GlobResolver, PathResolver, TarArchiver};
pub use cachet_client::{CacheBackend, RestBackend, RpcBackend};
pub use cachet_core::{CacheError, CacheResult, CompressionMethod};
