//! Cache key validation.
//!
//! A lookup is driven by a primary key followed by ordered restore keys.
//! Keys are validated once, before any network call, and are immutable
//! afterwards.

use crate::error::{CacheError, CacheResult};

/// Maximum number of keys (primary + restore keys) in one lookup
pub const MAX_KEYS: usize = 10;

/// Maximum length of a single key, in characters
pub const MAX_KEY_LENGTH: usize = 512;

/// Validated primary key plus ordered fallback prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    primary: String,
    restore_keys: Vec<String>,
}

impl CacheKey {
    /// Validate and build a key set
    pub fn new(primary: impl Into<String>, restore_keys: &[String]) -> CacheResult<Self> {
        let primary = primary.into();
        let total = 1 + restore_keys.len();
        if total > MAX_KEYS {
            return Err(CacheError::validation(format!(
                "Key Validation Error: Keys are limited to a maximum of {MAX_KEYS}."
            )));
        }

        check_key(&primary)?;
        for key in restore_keys {
            check_key(key)?;
        }

        Ok(Self {
            primary,
            restore_keys: restore_keys.to_vec(),
        })
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn restore_keys(&self) -> &[String] {
        &self.restore_keys
    }

    /// All keys in lookup precedence order
    pub fn all(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(1 + self.restore_keys.len());
        keys.push(self.primary.clone());
        keys.extend(self.restore_keys.iter().cloned());
        keys
    }

    /// Whether `matched` is the primary key (an exact hit)
    pub fn is_exact_match(&self, matched: &str) -> bool {
        self.primary == matched
    }
}

/// Check a single key against the length and character limits
pub fn check_key(key: &str) -> CacheResult<()> {
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(CacheError::validation(format!(
            "Key Validation Error: {key} cannot be larger than {MAX_KEY_LENGTH} characters."
        )));
    }
    if key.contains(',') {
        return Err(CacheError::validation(format!(
            "Key Validation Error: {key} cannot contain commas."
        )));
    }
    Ok(())
}

/// Reject an empty path list
pub fn check_paths(paths: &[String]) -> CacheResult<()> {
    if paths.is_empty() {
        return Err(CacheError::validation(
            "Path Validation Error: At least one directory or file path is required",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        let key = CacheKey::new("node-abc", &["node-".to_string()]).unwrap();
        assert_eq!(key.primary(), "node-abc");
        assert_eq!(key.all(), vec!["node-abc".to_string(), "node-".to_string()]);
        assert!(key.is_exact_match("node-abc"));
        assert!(!key.is_exact_match("node-"));
    }

    #[test]
    fn test_too_many_keys() {
        let restore: Vec<String> = (0..10).map(|i| format!("k{i}")).collect();
        let err = CacheKey::new("primary", &restore).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("maximum of 10"));

        // exactly ten keys is fine
        assert!(CacheKey::new("primary", &restore[..9]).is_ok());
    }

    #[test]
    fn test_key_too_long() {
        let long = "a".repeat(513);
        let err = check_key(&long).unwrap_err();
        assert!(err.to_string().contains("cannot be larger than 512 characters"));
        assert!(check_key(&"a".repeat(512)).is_ok());
    }

    #[test]
    fn test_key_with_comma() {
        let err = CacheKey::new("ok", &["bad,key".to_string()]).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("cannot contain commas"));
    }

    #[test]
    fn test_empty_paths_rejected() {
        let err = check_paths(&[]).unwrap_err();
        assert!(err.to_string().contains("At least one directory or file path is required"));
        assert!(check_paths(&["node_modules".to_string()]).is_ok());
    }
}
