//! Cache service wire types
//!
//! `v1` is the REST artifact cache protocol, `v2` the JSON encoding of the
//! RPC results service. Both use camelCase field names.

use serde::{Deserialize, Serialize};

/// Entry returned by a v1 lookup
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCacheEntry {
    /// Key that matched, primary or restore key
    pub cache_key: Option<String>,
    pub scope: Option<String>,
    pub cache_version: Option<String>,
    pub creation_time: Option<String>,
    /// Download URL of the archive
    pub archive_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveCacheRequest<'a> {
    pub key: &'a str,
    pub version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveCacheResponse {
    pub cache_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitCacheRequest {
    pub size: u64,
}

/// Twirp service path for the v2 cache RPCs
pub const CACHE_SERVICE: &str = "twirp/github.actions.results.api.v1.CacheService";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCacheEntryRequest<'a> {
    pub key: &'a str,
    pub version: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateCacheEntryResponse {
    pub ok: bool,
    #[serde(alias = "signed_upload_url")]
    pub signed_upload_url: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeCacheEntryUploadRequest<'a> {
    pub key: &'a str,
    pub version: &'a str,
    /// int64 travels as a string in proto JSON
    #[serde(with = "int64")]
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalizeCacheEntryUploadResponse {
    pub ok: bool,
    #[serde(with = "int64", alias = "entry_id")]
    pub entry_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCacheEntryDownloadUrlRequest<'a> {
    pub key: &'a str,
    pub restore_keys: &'a [String],
    pub version: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetCacheEntryDownloadUrlResponse {
    pub ok: bool,
    #[serde(alias = "signed_download_url")]
    pub signed_download_url: String,
    #[serde(alias = "matched_key")]
    pub matched_key: String,
}

/// proto3 JSON int64: written as a string, read from a string or a number
mod int64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}
