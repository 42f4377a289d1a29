//! Utility functions and helpers.
//!
//! Common functionality used across multiple cachet crates.

pub mod hash;
pub mod path;
pub mod url;

// Re-export commonly used utilities
pub use self::hash::sha256_hex;
pub use self::path::{is_safe_path, safe_join};
pub use self::url::redact_url;
