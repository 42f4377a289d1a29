//! Archive extraction
//!
//! Every member path is validated before anything is written. Members
//! under the root prefix are restored to their absolute location; all
//! others are restored below the workspace.

use cachet_core::error::CacheError;
use cachet_core::types::CompressionMethod;
use cachet_core::utils::safe_join;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, warn};

use super::{open_decoder, ROOT_PREFIX};
use crate::ArchiveResult;

/// Extract the archive at `archive_path` into `workspace`
///
/// Returns the number of entries restored.
pub fn extract_archive(
    archive_path: &Path,
    workspace: &Path,
    method: CompressionMethod,
) -> ArchiveResult<usize> {
    fs::create_dir_all(workspace)
        .map_err(|e| CacheError::io(format!("Failed to create {}", workspace.display()), e))?;

    let mut archive = Archive::new(open_decoder(archive_path, method)?);
    let entries = archive
        .entries()
        .map_err(|e| CacheError::io("Failed to read archive".to_string(), e))?;

    let mut count = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| CacheError::io("Failed to read archive entry".to_string(), e))?;
        let member = entry
            .path()
            .map_err(|e| CacheError::io("Invalid archive entry path".to_string(), e))?
            .into_owned();
        let dest = target_path(workspace, &member)?;
        let mode = entry.header().mode().ok();

        match entry.header().entry_type() {
            EntryType::Regular | EntryType::Continuous => {
                extract_regular_file(&mut entry, &dest)?;
            },
            EntryType::Directory => {
                fs::create_dir_all(&dest)
                    .map_err(|e| CacheError::io(format!("Failed to create {}", dest.display()), e))?;
            },
            EntryType::Symlink => {
                if !extract_symlink(&entry, &dest)? {
                    continue;
                }
            },
            other => {
                debug!("Skipping {:?} entry {}", other, member.display());
                continue;
            },
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let is_link = fs::symlink_metadata(&dest).map(|m| m.file_type().is_symlink()).unwrap_or(false);
            if let (Some(mode), false) = (mode, is_link) {
                let _ = fs::set_permissions(&dest, fs::Permissions::from_mode(mode));
            }
        }
        #[cfg(not(unix))]
        let _ = mode;

        count += 1;
    }

    debug!("Extracted {} entries from {}", count, archive_path.display());
    Ok(count)
}

/// Map an archive member to the path it is restored to
fn target_path(workspace: &Path, member: &Path) -> ArchiveResult<PathBuf> {
    let mut components = member.components();
    match components.next() {
        Some(Component::Normal(first)) if first == ROOT_PREFIX => {
            safe_join(&filesystem_root(workspace), components.as_path())
        },
        _ => safe_join(workspace, member),
    }
}

/// Root of the filesystem holding `workspace`
fn filesystem_root(workspace: &Path) -> PathBuf {
    workspace
        .ancestors()
        .last()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

fn extract_regular_file<R: Read>(entry: &mut tar::Entry<R>, dest: &Path) -> ArchiveResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CacheError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    remove_existing_link(dest)?;

    let mut file = fs::File::create(dest)
        .map_err(|e| CacheError::io(format!("Failed to create {}", dest.display()), e))?;
    std::io::copy(entry, &mut file)
        .map_err(|e| CacheError::io(format!("Failed to write {}", dest.display()), e))?;
    Ok(())
}

/// Restore a relative symlink; absolute targets are skipped
fn extract_symlink<R: Read>(entry: &tar::Entry<R>, dest: &Path) -> ArchiveResult<bool> {
    let target = match entry
        .link_name()
        .map_err(|e| CacheError::io("Invalid symlink target".to_string(), e))?
    {
        Some(target) => target.into_owned(),
        None => return Ok(false),
    };

    if target.is_absolute() {
        warn!("Skipping symlink {} with absolute target {}", dest.display(), target.display());
        return Ok(false);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CacheError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    remove_existing_link(dest)?;

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, dest)
            .map_err(|e| CacheError::io(format!("Failed to link {}", dest.display()), e))?;
    }

    #[cfg(windows)]
    {
        let resolved = dest.parent().unwrap_or(dest).join(&target);
        let created = if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(&target, dest)
        } else {
            std::os::windows::fs::symlink_file(&target, dest)
        };
        created.map_err(|e| CacheError::io(format!("Failed to link {}", dest.display()), e))?;
    }

    Ok(true)
}

/// Unlink a symlink at `path` so writes never follow it
fn remove_existing_link(path: &Path) -> ArchiveResult<()> {
    if let Ok(meta) = fs::symlink_metadata(path) {
        if meta.file_type().is_symlink() {
            fs::remove_file(path)
                .map_err(|e| CacheError::io(format!("Failed to replace {}", path.display()), e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::Builder;
    use tempfile::tempdir;

    /// Gzip tar holding one file with a raw, unvalidated member name
    fn raw_archive(dir: &Path, name: &[u8], body: &[u8]) -> PathBuf {
        let path = dir.join("raw.tgz");
        let file = fs::File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));

        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(body.len() as u64);
        header.set_cksum();
        builder.append(&header, body).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_extract_single_file() {
        let temp = tempdir().unwrap();
        let workspace = temp.path().join("workspace");
        let archive = raw_archive(temp.path(), b"dist/app.js", b"hello world");

        let count = extract_archive(&archive, &workspace, CompressionMethod::Gzip).unwrap();
        assert_eq!(count, 1);
        assert_eq!(fs::read_to_string(workspace.join("dist/app.js")).unwrap(), "hello world");
    }

    #[test]
    fn test_traversal_is_rejected() {
        let temp = tempdir().unwrap();
        let workspace = temp.path().join("workspace");
        let archive = raw_archive(temp.path(), b"../escaped.txt", b"nope");

        let err = extract_archive(&archive, &workspace, CompressionMethod::Gzip).unwrap_err();
        assert!(matches!(err, CacheError::Archive { .. }));
        assert!(!temp.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_root_prefix_maps_to_filesystem_root() {
        let workspace = Path::new("/work/repo");
        assert_eq!(
            target_path(workspace, Path::new("__root__/home/runner/.cache/x")).unwrap(),
            PathBuf::from("/home/runner/.cache/x")
        );
        assert_eq!(
            target_path(workspace, Path::new("target/debug")).unwrap(),
            PathBuf::from("/work/repo/target/debug")
        );
        assert!(target_path(workspace, Path::new("__root__/../etc")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_symlink_is_replaced_not_followed() {
        let temp = tempdir().unwrap();
        let workspace = temp.path().join("workspace");
        fs::create_dir_all(&workspace).unwrap();
        let victim = temp.path().join("victim.txt");
        fs::write(&victim, "original").unwrap();
        std::os::unix::fs::symlink(&victim, workspace.join("out.txt")).unwrap();

        let archive = raw_archive(temp.path(), b"out.txt", b"restored");
        extract_archive(&archive, &workspace, CompressionMethod::Gzip).unwrap();

        assert_eq!(fs::read_to_string(&victim).unwrap(), "original");
        assert_eq!(fs::read_to_string(workspace.join("out.txt")).unwrap(), "restored");
    }
}
