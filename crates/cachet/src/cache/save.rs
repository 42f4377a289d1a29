use std::path::{Path, PathBuf};

use cachet_client::{Finalization, Reservation, UploadTicket, VersionOptions};
use cachet_core::error::{CacheError, CacheResult};
use cachet_core::types::key::{check_key, check_paths};
use cachet_core::types::ArchiveFile;
use tracing::{debug, info, warn};

use super::{remove_archive, scratch_dir, Cache};
use crate::options::SaveOptions;
use crate::outcome::SaveOutcome;

impl Cache {
    /// Archive `paths` and save them under `key`
    ///
    /// A reservation conflict, an oversized archive and any transfer or
    /// commit failure come back as a [`SaveOutcome`]; only invalid input
    /// is an error.
    pub async fn save_cache(
        &self,
        paths: &[String],
        key: &str,
        options: &SaveOptions,
    ) -> CacheResult<SaveOutcome> {
        check_paths(paths)?;
        check_key(key)?;

        let members = self.resolver.resolve(paths)?;
        if members.is_empty() {
            return Err(CacheError::validation(
                "Path Validation Error: Path(s) specified in the action for caching do(es) not exist, hence no cache is being saved.",
            ));
        }
        debug!("Cache Paths: {:?}", members);

        match self.try_save(paths, &members, key, options).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_validation() => Err(e),
            Err(e) => {
                warn!("Failed to save: {}", e);
                Ok(SaveOutcome::Failed {
                    reason: e.to_string(),
                })
            },
        }
    }

    async fn try_save(
        &self,
        paths: &[String],
        members: &[PathBuf],
        key: &str,
        options: &SaveOptions,
    ) -> CacheResult<SaveOutcome> {
        let version_options = self.version_options(options.cross_os);
        let ticket = match self.backend.reserve(key, paths, &version_options).await? {
            Reservation::Reserved(ticket) => ticket,
            Reservation::Conflict { reason } => {
                info!("Failed to save: {}", reason);
                return Ok(SaveOutcome::Conflict { reason });
            },
        };

        let scratch = scratch_dir()?;
        let archive_path = self
            .archiver
            .create_archive(scratch.path(), members, version_options.compression)
            .await?;
        debug!("Archive Path: {}", archive_path.display());

        let result = self
            .upload_archive(key, &ticket, &archive_path, version_options)
            .await;
        remove_archive(&archive_path);
        result
    }

    async fn upload_archive(
        &self,
        key: &str,
        ticket: &UploadTicket,
        archive_path: &Path,
        version_options: VersionOptions,
    ) -> CacheResult<SaveOutcome> {
        let archive = ArchiveFile::measure(archive_path, version_options.compression)?;
        self.log_archive_members(&archive.path, archive.compression).await;
        debug!("File Size: {}", archive.size);

        if let Some(limit) = self.enforced_size_limit() {
            if archive.size > limit {
                warn!(
                    "Failed to save: {}",
                    CacheError::ArchiveTooLarge {
                        size: archive.size,
                        limit,
                    }
                );
                return Ok(SaveOutcome::TooLarge {
                    size: archive.size,
                    limit,
                });
            }
        }

        debug!("Uploading cache with {} backend", self.backend.name());
        self.backend
            .transfer_up(ticket, &archive, &self.options.upload)
            .await?;

        match self.backend.finalize(ticket, archive.size).await? {
            Finalization::Committed { entry_id } => {
                info!("Cache saved with key: {}", key);
                Ok(SaveOutcome::Saved { entry_id })
            },
            Finalization::Rejected { reason } => {
                warn!("Failed to save: {}", reason);
                Ok(SaveOutcome::Failed { reason })
            },
        }
    }
}
