//! Cache version fingerprinting.
//!
//! A version namespaces cache entries by path set, compression method and
//! platform so that archives produced differently never collide under the
//! same key. The computation is pure: no I/O, no clock.

use std::fmt;

use crate::types::CompressionMethod;
use crate::utils::hash::sha256_hex;

/// Bump to invalidate every existing cache entry
pub const VERSION_SALT: &str = "1.0";

/// Appended on Windows unless cross-OS archives are enabled
pub const WINDOWS_ONLY_MARKER: &str = "windows-only";

/// Which backend's rules decide whether the compression token is hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    /// REST protocol: the default (gzip) method is left out of the hash
    Rest,
    /// RPC protocol: the method is always part of the hash
    Rpc,
}

/// Host platform as far as the fingerprint is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

/// Opaque lowercase hex digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builder over every input of the version hash
#[derive(Debug, Clone)]
pub struct Fingerprint<'a> {
    paths: &'a [String],
    compression: Option<CompressionMethod>,
    cross_os: bool,
    scheme: VersionScheme,
    platform: Platform,
    salt: &'a str,
}

impl<'a> Fingerprint<'a> {
    pub fn new(paths: &'a [String]) -> Self {
        Self {
            paths,
            compression: None,
            cross_os: false,
            scheme: VersionScheme::Rest,
            platform: Platform::current(),
            salt: VERSION_SALT,
        }
    }

    pub fn compression(mut self, compression: Option<CompressionMethod>) -> Self {
        self.compression = compression;
        self
    }

    pub fn cross_os(mut self, cross_os: bool) -> Self {
        self.cross_os = cross_os;
        self
    }

    pub fn scheme(mut self, scheme: VersionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn salt(mut self, salt: &'a str) -> Self {
        self.salt = salt;
        self
    }

    /// Components in hashing order, exposed for debugging
    pub fn components(&self) -> Vec<&str> {
        let mut components: Vec<&str> = self.paths.iter().map(String::as_str).collect();

        if let Some(method) = self.compression {
            let include = match self.scheme {
                VersionScheme::Rest => !method.is_gzip(),
                VersionScheme::Rpc => true,
            };
            if include {
                components.push(method.as_str());
            }
        }

        if self.platform == Platform::Windows && !self.cross_os {
            components.push(WINDOWS_ONLY_MARKER);
        }

        components.push(self.salt);
        components
    }

    pub fn compute(&self) -> CacheVersion {
        CacheVersion(sha256_hex(self.components().join("|").as_bytes()))
    }
}

/// Version for the current platform with the default salt
pub fn compute_version(
    paths: &[String],
    compression: Option<CompressionMethod>,
    cross_os: bool,
    scheme: VersionScheme,
) -> CacheVersion {
    Fingerprint::new(paths)
        .compression(compression)
        .cross_os(cross_os)
        .scheme(scheme)
        .compute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_known_digest() {
        // sha256("node_modules|1.0")
        let p = paths(&["node_modules"]);
        let version = Fingerprint::new(&p).platform(Platform::Other).compute();
        assert_eq!(version.as_str(), sha256_hex(b"node_modules|1.0"));
        assert_eq!(version.as_str().len(), 64);
        assert!(version.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_rest_scheme_omits_gzip() {
        let p = paths(&["a", "b"]);
        let base = Fingerprint::new(&p).platform(Platform::Other);
        assert_eq!(
            base.clone().compression(Some(CompressionMethod::Gzip)).components(),
            vec!["a", "b", "1.0"]
        );
        assert_eq!(
            base.clone().compression(Some(CompressionMethod::Zstd)).components(),
            vec!["a", "b", "zstd", "1.0"]
        );
    }

    #[test]
    fn test_rpc_scheme_always_includes_method() {
        let p = paths(&["a"]);
        let fp = Fingerprint::new(&p)
            .platform(Platform::Other)
            .scheme(VersionScheme::Rpc)
            .compression(Some(CompressionMethod::Gzip));
        assert_eq!(fp.components(), vec!["a", "gzip", "1.0"]);
    }

    #[test]
    fn test_windows_marker() {
        let p = paths(&["a"]);
        let windows = Fingerprint::new(&p).platform(Platform::Windows);
        assert_eq!(windows.components(), vec!["a", "windows-only", "1.0"]);
        assert_eq!(windows.clone().cross_os(true).components(), vec!["a", "1.0"]);
        assert_ne!(windows.compute(), windows.clone().cross_os(true).compute());

        // cross-OS flag is irrelevant elsewhere
        let other = Fingerprint::new(&p).platform(Platform::Other);
        assert_eq!(other.compute(), other.clone().cross_os(true).compute());
    }

    #[test]
    fn test_salt_changes_digest() {
        let p = paths(&["a"]);
        let fp = Fingerprint::new(&p).platform(Platform::Other);
        assert_ne!(fp.compute(), fp.clone().salt("2.0").compute());
    }

    #[test]
    fn test_path_order_matters() {
        let ab = paths(&["a", "b"]);
        let ba = paths(&["b", "a"]);
        assert_ne!(
            Fingerprint::new(&ab).compute(),
            Fingerprint::new(&ba).compute()
        );
    }

    proptest! {
        #[test]
        fn version_is_deterministic(items in prop::collection::vec("[a-z/_.*]{1,12}", 1..6), cross_os: bool) {
            let first = compute_version(&items, Some(CompressionMethod::Zstd), cross_os, VersionScheme::Rpc);
            let second = compute_version(&items, Some(CompressionMethod::Zstd), cross_os, VersionScheme::Rpc);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn changing_a_path_changes_version(items in prop::collection::vec("[a-z]{1,8}", 1..6), extra in "[A-Z]{1,4}") {
            let mut changed = items.clone();
            changed[0].push_str(&extra);
            prop_assert_ne!(
                compute_version(&items, None, false, VersionScheme::Rest),
                compute_version(&changed, None, false, VersionScheme::Rest)
            );
        }
    }
}
