//! Path checks for archive members.
//!
//! Archive entries must stay inside the directory they are unpacked into.

use crate::error::{CacheError, CacheResult};
use std::path::{Component, Path, PathBuf};

/// Check that a relative path never climbs above its base
pub fn is_safe_path(path: &Path) -> bool {
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::Normal(_) => depth += 1,
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }

    true
}

/// Join an archive member onto the extraction root
pub fn safe_join(base: &Path, member: &Path) -> CacheResult<PathBuf> {
    if !is_safe_path(member) {
        return Err(CacheError::archive(format!(
            "archive entry escapes the extraction root: {}",
            member.display()
        )));
    }

    let mut joined = base.to_path_buf();
    for component in member.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::ParentDir => {
                joined.pop();
            },
            _ => {},
        }
    }
    Ok(joined)
}
