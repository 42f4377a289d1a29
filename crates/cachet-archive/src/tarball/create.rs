//! Archive creation
//!
//! Directories are walked without following symlinks, so links are stored
//! as links rather than duplicated content.

use cachet_core::error::CacheError;
use cachet_core::types::CompressionMethod;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::debug;
use walkdir::WalkDir;

use super::{member_name, Encoder};
use crate::ArchiveResult;

/// Write a compressed tar of `members` to `archive_path`
///
/// Returns the number of entries written.
pub fn create_archive(
    archive_path: &Path,
    workspace: &Path,
    members: &[PathBuf],
    method: CompressionMethod,
) -> ArchiveResult<usize> {
    let file = File::create(archive_path)
        .map_err(|e| CacheError::io(format!("Failed to create {}", archive_path.display()), e))?;
    let encoder = Encoder::new(BufWriter::new(file), method)
        .map_err(|e| CacheError::io("Failed to start compressor".to_string(), e))?;

    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut count = 0;
    for member in members {
        for entry in WalkDir::new(member).follow_links(false) {
            let entry = entry.map_err(|e| {
                CacheError::archive(format!("Failed to walk {}: {}", member.display(), e))
            })?;
            let path = entry.path();
            let name = member_name(workspace, path);

            // The workspace itself has no member name
            if name.as_os_str().is_empty() {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                builder
                    .append_dir(&name, path)
                    .map_err(|e| CacheError::io(format!("Failed to add {}", path.display()), e))?;
            } else if file_type.is_file() || file_type.is_symlink() {
                builder
                    .append_path_with_name(path, &name)
                    .map_err(|e| CacheError::io(format!("Failed to add {}", path.display()), e))?;
            } else {
                debug!("Skipping special file {}", path.display());
                continue;
            }
            count += 1;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| CacheError::io("Failed to finish archive".to_string(), e))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| CacheError::io("Failed to finish compression".to_string(), e))?;
    std::io::Write::flush(&mut writer)
        .map_err(|e| CacheError::io("Failed to flush archive".to_string(), e))?;

    let size = fs::metadata(archive_path).map(|m| m.len()).unwrap_or_default();
    debug!("Created archive {} with {} entries ({} B)", archive_path.display(), count, size);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarball::{extract_archive, list_archive};
    use tempfile::tempdir;

    fn sample_workspace(root: &Path) -> PathBuf {
        let workspace = root.join("workspace");
        fs::create_dir_all(workspace.join("node_modules/pkg")).unwrap();
        fs::write(workspace.join("node_modules/pkg/index.js"), "module.exports = 1;").unwrap();
        fs::write(workspace.join("node_modules/pkg/package.json"), "{}").unwrap();
        workspace
    }

    #[test]
    fn test_gzip_round_trip() {
        let temp = tempdir().unwrap();
        let workspace = sample_workspace(temp.path());
        let archive = temp.path().join("cache.tgz");

        let count = create_archive(
            &archive,
            &workspace,
            &[workspace.join("node_modules")],
            CompressionMethod::Gzip,
        )
        .unwrap();
        assert_eq!(count, 4);

        fs::remove_dir_all(workspace.join("node_modules")).unwrap();
        extract_archive(&archive, &workspace, CompressionMethod::Gzip).unwrap();

        let restored = fs::read_to_string(workspace.join("node_modules/pkg/index.js")).unwrap();
        assert_eq!(restored, "module.exports = 1;");
    }

    #[test]
    fn test_zstd_archives_list_members() {
        let temp = tempdir().unwrap();
        let workspace = sample_workspace(temp.path());

        for method in [CompressionMethod::Zstd, CompressionMethod::ZstdWithoutLong] {
            let archive = temp.path().join(format!("{}.tzst", method.as_str()));
            create_archive(&archive, &workspace, &[workspace.join("node_modules/pkg/index.js")], method)
                .unwrap();

            let members = list_archive(&archive, method).unwrap();
            assert_eq!(members, vec![PathBuf::from("node_modules/pkg/index.js")]);
        }
    }

    #[test]
    fn test_paths_outside_workspace_use_root_prefix() {
        let temp = tempdir().unwrap();
        let workspace = sample_workspace(temp.path());
        let outside = temp.path().join("home/.npm");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("_cacache"), "index").unwrap();

        let archive = temp.path().join("cache.tgz");
        create_archive(&archive, &workspace, &[outside.join("_cacache")], CompressionMethod::Gzip)
            .unwrap();

        let members = list_archive(&archive, CompressionMethod::Gzip).unwrap();
        assert_eq!(members.len(), 1);
        assert!(members[0].starts_with("__root__"));
        assert!(members[0].ends_with("home/.npm/_cacache"));

        fs::remove_file(outside.join("_cacache")).unwrap();
        extract_archive(&archive, &workspace, CompressionMethod::Gzip).unwrap();
        assert_eq!(fs::read_to_string(outside.join("_cacache")).unwrap(), "index");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_stored_as_links() {
        let temp = tempdir().unwrap();
        let workspace = sample_workspace(temp.path());
        std::os::unix::fs::symlink("pkg/index.js", workspace.join("node_modules/entry.js")).unwrap();

        let archive = temp.path().join("cache.tgz");
        create_archive(&archive, &workspace, &[workspace.join("node_modules")], CompressionMethod::Gzip)
            .unwrap();

        fs::remove_dir_all(workspace.join("node_modules")).unwrap();
        extract_archive(&archive, &workspace, CompressionMethod::Gzip).unwrap();

        let link = workspace.join("node_modules/entry.js");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&link).unwrap(), "module.exports = 1;");
    }
}
