//! Result of a save

use std::fmt;

/// What happened to a save; failures are values, not errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The entry was committed
    Saved { entry_id: i64 },
    /// Another job holds the reservation for this key and version
    Conflict { reason: String },
    /// The archive exceeded the enforced size cap and was not uploaded
    TooLarge { size: u64, limit: u64 },
    /// Upload or commit failed
    Failed { reason: String },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }

    /// Entry id of a saved cache, `-1` otherwise
    pub fn cache_id(&self) -> i64 {
        match self {
            SaveOutcome::Saved { entry_id } => *entry_id,
            _ => -1,
        }
    }
}

impl fmt::Display for SaveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveOutcome::Saved { entry_id } => write!(f, "saved (entry {entry_id})"),
            SaveOutcome::Conflict { reason } => write!(f, "not saved: {reason}"),
            SaveOutcome::TooLarge { size, limit } => {
                write!(f, "not saved: archive of {size} B exceeds the {limit} B limit")
            },
            SaveOutcome::Failed { reason } => write!(f, "not saved: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_id_sentinel() {
        assert_eq!(SaveOutcome::Saved { entry_id: 42 }.cache_id(), 42);
        assert_eq!(SaveOutcome::Conflict { reason: "busy".into() }.cache_id(), -1);
        assert_eq!(SaveOutcome::TooLarge { size: 2, limit: 1 }.cache_id(), -1);
        assert_eq!(SaveOutcome::Failed { reason: "boom".into() }.cache_id(), -1);
    }
}
