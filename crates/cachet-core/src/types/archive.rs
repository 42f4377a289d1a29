//! Local archive handle.

use std::path::{Path, PathBuf};

use super::CompressionMethod;
use crate::error::{CacheError, CacheResult};

/// Archive produced by the archiver, owned by one save/restore call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub compression: CompressionMethod,
    pub size: u64,
}

impl ArchiveFile {
    /// Measure an archive on disk
    pub fn measure(path: impl Into<PathBuf>, compression: CompressionMethod) -> CacheResult<Self> {
        let path = path.into();
        let size = file_size(&path)?;
        Ok(Self {
            path,
            compression,
            size,
        })
    }

    /// Size in whole MiB, rounded, for log lines
    pub fn size_mib(&self) -> u64 {
        (self.size + 512 * 1024) / (1024 * 1024)
    }
}

/// Size of a file in bytes
pub fn file_size(path: &Path) -> CacheResult<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| CacheError::io(format!("Failed to stat archive {}", path.display()), e))
}
