//! Async archiver seam used by the orchestrator

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cachet_core::error::CacheError;
use cachet_core::types::CompressionMethod;
use tracing::debug;

use crate::tarball;
use crate::ArchiveResult;

/// Produces and unpacks cache archives
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Method used when saving
    fn compression(&self) -> CompressionMethod;

    /// Archive `paths` into `folder`, returning the archive path
    async fn create_archive(
        &self,
        folder: &Path,
        paths: &[PathBuf],
        method: CompressionMethod,
    ) -> ArchiveResult<PathBuf>;

    async fn extract_archive(&self, archive: &Path, method: CompressionMethod) -> ArchiveResult<()>;

    /// Member paths, used for debug listings
    async fn list_archive(&self, archive: &Path, method: CompressionMethod) -> ArchiveResult<Vec<PathBuf>>;
}

/// In-process tar archiver rooted at a workspace
#[derive(Debug, Clone)]
pub struct TarArchiver {
    workspace: PathBuf,
    compression: CompressionMethod,
}

impl TarArchiver {
    pub fn new(workspace: impl Into<PathBuf>, compression: CompressionMethod) -> Self {
        Self {
            workspace: workspace.into(),
            compression,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Run blocking archive work off the async runtime
async fn blocking<T, F>(task: F) -> ArchiveResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ArchiveResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CacheError::archive(format!("Archive task failed: {e}")))?
}

#[async_trait]
impl Archiver for TarArchiver {
    fn compression(&self) -> CompressionMethod {
        self.compression
    }

    async fn create_archive(
        &self,
        folder: &Path,
        paths: &[PathBuf],
        method: CompressionMethod,
    ) -> ArchiveResult<PathBuf> {
        let archive_path = folder.join(method.archive_file_name());
        let workspace = self.workspace.clone();
        let members = paths.to_vec();
        let target = archive_path.clone();

        let count = blocking(move || tarball::create_archive(&target, &workspace, &members, method)).await?;
        debug!("Archived {} entries to {}", count, archive_path.display());
        Ok(archive_path)
    }

    async fn extract_archive(&self, archive: &Path, method: CompressionMethod) -> ArchiveResult<()> {
        let workspace = self.workspace.clone();
        let archive = archive.to_path_buf();
        blocking(move || tarball::extract_archive(&archive, &workspace, method)).await?;
        Ok(())
    }

    async fn list_archive(&self, archive: &Path, method: CompressionMethod) -> ArchiveResult<Vec<PathBuf>> {
        let archive = archive.to_path_buf();
        blocking(move || tarball::list_archive(&archive, method)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_archive_lands_in_folder_with_method_name() {
        let temp = tempdir().unwrap();
        let workspace = temp.path().join("workspace");
        let scratch = temp.path().join("scratch");
        fs::create_dir_all(workspace.join("target")).unwrap();
        fs::create_dir_all(&scratch).unwrap();
        fs::write(workspace.join("target/out.bin"), [1u8, 2, 3]).unwrap();

        let archiver = TarArchiver::new(&workspace, CompressionMethod::Zstd);
        let archive = archiver
            .create_archive(&scratch, &[workspace.join("target")], archiver.compression())
            .await
            .unwrap();
        assert_eq!(archive, scratch.join("cache.tzst"));

        let members = archiver.list_archive(&archive, CompressionMethod::Zstd).await.unwrap();
        assert!(members.contains(&PathBuf::from("target/out.bin")));

        fs::remove_dir_all(workspace.join("target")).unwrap();
        archiver.extract_archive(&archive, CompressionMethod::Zstd).await.unwrap();
        assert_eq!(fs::read(workspace.join("target/out.bin")).unwrap(), vec![1u8, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_archive_is_an_error() {
        let temp = tempdir().unwrap();
        let archiver = TarArchiver::new(temp.path(), CompressionMethod::Gzip);
        let err = archiver
            .extract_archive(&temp.path().join("missing.tgz"), CompressionMethod::Gzip)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }
}
