use std::path::Path;

use cachet_client::CacheEntry;
use cachet_core::error::CacheResult;
use cachet_core::types::key::check_paths;
use cachet_core::types::{ArchiveFile, CacheKey};
use tracing::{debug, info, warn};

use super::{remove_archive, scratch_dir, Cache};
use crate::options::RestoreOptions;

impl Cache {
    /// Restore the first entry matching `primary` or one of `restore_keys`
    ///
    /// Returns the matched key, or `None` when nothing was restored. Only
    /// invalid paths or keys are returned as errors; every other failure is
    /// logged as a warning and reported as a miss.
    pub async fn restore_cache(
        &self,
        paths: &[String],
        primary: &str,
        restore_keys: &[String],
        options: &RestoreOptions,
    ) -> CacheResult<Option<String>> {
        check_paths(paths)?;
        let keys = CacheKey::new(primary, restore_keys)?;
        debug!("Resolved Keys: {:?}", keys.all());

        match self.try_restore(paths, &keys, options).await {
            Ok(matched) => Ok(matched),
            Err(e) if e.is_validation() => Err(e),
            Err(e) => {
                warn!("Failed to restore: {}", e);
                Ok(None)
            },
        }
    }

    async fn try_restore(
        &self,
        paths: &[String],
        keys: &CacheKey,
        options: &RestoreOptions,
    ) -> CacheResult<Option<String>> {
        let version_options = self.version_options(options.cross_os);
        let Some(entry) = self.backend.lookup(keys, paths, &version_options).await? else {
            info!("Cache not found for input keys: {}", keys.all().join(", "));
            return Ok(None);
        };

        if options.lookup_only {
            info!("Lookup only - skipping download");
            return Ok(Some(entry.matched_key));
        }

        let scratch = scratch_dir()?;
        let archive_path = scratch.path().join(entry.compression.archive_file_name());
        debug!("Archive Path: {}", archive_path.display());

        let result = self.download_and_extract(&entry, &archive_path).await;
        remove_archive(&archive_path);
        result?;

        if keys.is_exact_match(&entry.matched_key) {
            info!("Cache restored from key: {}", entry.matched_key);
        } else {
            info!("Cache restored from restore key: {}", entry.matched_key);
        }
        Ok(Some(entry.matched_key))
    }

    async fn download_and_extract(&self, entry: &CacheEntry, archive_path: &Path) -> CacheResult<()> {
        self.backend
            .transfer_down(entry, archive_path, &self.options.download)
            .await?;

        let archive = ArchiveFile::measure(archive_path, entry.compression)?;
        info!("Cache Size: ~{} MB ({} B)", archive.size_mib(), archive.size);

        self.log_archive_members(&archive.path, archive.compression).await;
        self.archiver
            .extract_archive(&archive.path, archive.compression)
            .await
    }
}
