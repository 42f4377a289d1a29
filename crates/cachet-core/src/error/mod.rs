//! Error types and result aliases for cache operations.
//!
//! One error type covers every failure class a cache call can hit. The
//! orchestrator uses the classifiers below to decide which errors are
//! contained (logged and turned into a miss / unsaved outcome) and which
//! are allowed to reach the caller.

use thiserror::Error;

/// Unified error type for all cachet operations
#[derive(Error, Debug)]
pub enum CacheError {
    // Input errors
    #[error("{message}")]
    Validation { message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Transport errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cache service responded with {status}{}", context.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
    Service { status: u16, context: Option<String> },

    #[error("{operation} failed: {message}")]
    RetriesExhausted {
        operation: String,
        message: String,
        status: Option<u16>,
    },

    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: String, millis: u64 },

    #[error("Invalid response from cache service: {message}")]
    InvalidResponse { message: String },

    // Transfer errors
    #[error("Incomplete download. Expected file size: {expected}, actual file size: {actual}")]
    IncompleteDownload { expected: u64, actual: u64 },

    #[error(
        "Cache size of ~{} MB ({size} B) is over the {} limit, not saving cache.",
        size / (1024 * 1024),
        format_limit(*limit)
    )]
    ArchiveTooLarge { size: u64, limit: u64 },

    // Archiver errors
    #[error("Archive error: {message}")]
    Archive { message: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for cachet operations
pub type CacheResult<T> = Result<T, CacheError>;

fn format_limit(limit: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    if limit % GIB == 0 {
        format!("{}GB", limit / GIB)
    } else {
        format!("{limit} B")
    }
}

impl CacheError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create an archiver error
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Input errors are the only class allowed to escape restore/save
    pub fn is_validation(&self) -> bool {
        matches!(self, CacheError::Validation { .. })
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            CacheError::Service { status, .. } => Some(*status),
            CacheError::RetriesExhausted { status, .. } => *status,
            _ => None,
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            CacheError::Validation { .. } => {
                Some("Check the cache paths and keys passed to the command")
            },
            CacheError::ConfigValidation { .. } => {
                Some("Make sure ACTIONS_RUNTIME_TOKEN and the cache service URL are set")
            },
            CacheError::Network { .. } | CacheError::Timeout { .. } => {
                Some("The cache service may be unreachable; the build continues without it")
            },
            CacheError::ArchiveTooLarge { .. } => {
                Some("Cache fewer or smaller paths to stay under the size limit")
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_message() {
        let err = CacheError::Service {
            status: 503,
            context: Some("during upload chunk.".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Cache service responded with 503 during upload chunk."
        );

        let bare = CacheError::Service {
            status: 500,
            context: None,
        };
        assert_eq!(bare.to_string(), "Cache service responded with 500");
    }

    #[test]
    fn test_too_large_message_contains_size() {
        let err = CacheError::ArchiveTooLarge {
            size: 11 * 1024 * 1024 * 1024,
            limit: 10 * 1024 * 1024 * 1024,
        };
        let message = err.to_string();
        assert!(message.contains("11811160064 B"));
        assert!(message.contains("10GB limit"));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(CacheError::Service { status: 502, context: None }.status(), Some(502));
        assert_eq!(CacheError::validation("bad key").status(), None);
        assert!(CacheError::validation("bad key").is_validation());
        assert!(!CacheError::archive("truncated").is_validation());
    }
}
