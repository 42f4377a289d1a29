//! Glob path resolution
//!
//! Patterns are expanded in input order. A pattern starting with `!`
//! removes everything it matches, including descendants of a matched
//! directory, from the paths collected so far.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cachet_core::error::CacheError;
use tracing::debug;

use crate::ArchiveResult;

/// Turns user path patterns into concrete paths
pub trait PathResolver: Send + Sync {
    fn resolve(&self, patterns: &[String]) -> ArchiveResult<Vec<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct GlobResolver {
    workspace: PathBuf,
}

impl GlobResolver {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// Absolute form of a pattern, with `~` expanded
    fn absolute_pattern(&self, pattern: &str) -> String {
        let expanded = match pattern.strip_prefix('~') {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
                Some(home) => format!("{}{}", home.display(), rest),
                None => pattern.to_string(),
            },
            _ => pattern.to_string(),
        };

        if Path::new(&expanded).is_absolute() {
            expanded
        } else {
            self.workspace.join(expanded).to_string_lossy().into_owned()
        }
    }

    fn expand(&self, pattern: &str) -> ArchiveResult<Vec<PathBuf>> {
        let absolute = self.absolute_pattern(pattern);
        let paths = glob::glob(&absolute)
            .map_err(|e| CacheError::validation(format!("Invalid path pattern '{pattern}': {e}")))?;

        let mut matched = Vec::new();
        for path in paths {
            match path {
                Ok(path) => matched.push(path),
                Err(e) => debug!("Skipping unreadable path {}: {}", e.path().display(), e),
            }
        }
        Ok(matched)
    }
}

impl PathResolver for GlobResolver {
    fn resolve(&self, patterns: &[String]) -> ArchiveResult<Vec<PathBuf>> {
        let mut resolved: Vec<PathBuf> = Vec::new();
        let mut seen = HashSet::new();

        for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            if let Some(excluded) = pattern.strip_prefix('!') {
                let removed = self.expand(excluded)?;
                resolved.retain(|path| !removed.iter().any(|r| path.starts_with(r)));
                seen.retain(|path: &PathBuf| !removed.iter().any(|r| path.starts_with(r)));
                continue;
            }

            for path in self.expand(pattern)? {
                if seen.insert(path.clone()) {
                    resolved.push(path);
                }
            }
        }

        debug!("Resolved {} path(s) from {} pattern(s)", resolved.len(), patterns.len());
        Ok(resolved)
    }
}
