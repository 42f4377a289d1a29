//! Archive compression methods.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Compression applied by the archiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionMethod {
    #[default]
    Gzip,
    /// zstd with long-distance matching
    Zstd,
    ZstdWithoutLong,
}

impl CompressionMethod {
    /// Token used in version fingerprints and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMethod::Gzip => "gzip",
            CompressionMethod::Zstd => "zstd",
            CompressionMethod::ZstdWithoutLong => "zstd-without-long",
        }
    }

    /// Canonical archive filename for this method
    pub fn archive_file_name(&self) -> &'static str {
        match self {
            CompressionMethod::Gzip => "cache.tgz",
            CompressionMethod::Zstd | CompressionMethod::ZstdWithoutLong => "cache.tzst",
        }
    }

    pub fn is_gzip(&self) -> bool {
        matches!(self, CompressionMethod::Gzip)
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionMethod {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gzip" => Ok(CompressionMethod::Gzip),
            "zstd" => Ok(CompressionMethod::Zstd),
            "zstd-without-long" => Ok(CompressionMethod::ZstdWithoutLong),
            other => Err(CacheError::ConfigValidation {
                field: "compression".to_string(),
                reason: format!("unknown compression method '{other}'"),
            }),
        }
    }
}
