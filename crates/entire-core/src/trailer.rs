//! Commit-message trailer keys.
//!
//! `TRAILER_CHECKPOINT` is the only key permitted on user-branch commits.
//! The rest are reserved for shadow-branch and metadata-branch commits.

/// Links a user-branch commit to its permanent checkpoint.
pub const TRAILER_CHECKPOINT: &str = "Entire-Checkpoint";

/// Owning session of a shadow or metadata commit. Mandatory on every
/// shadow-branch commit.
pub const TRAILER_SESSION: &str = "Entire-Session";

/// Strategy that produced a metadata-branch commit.
pub const TRAILER_STRATEGY: &str = "Entire-Strategy";

/// Agent that produced a metadata-branch commit.
pub const TRAILER_AGENT: &str = "Entire-Agent";

/// Ref the checkpoint was condensed from.
pub const TRAILER_SOURCE_REF: &str = "Entire-Source-Ref";

/// Marks a commit as a temporary checkpoint on a shadow branch.
pub const TRAILER_TEMPORARY: &str = "Entire-Temporary";

/// Tool-use id for sub-agent checkpoints.
pub const TRAILER_TOOL_USE: &str = "Entire-Tool-Use";

/// Monotonic sequence number for sub-agent checkpoint increments.
pub const TRAILER_SEQUENCE: &str = "Entire-Sequence";

/// Keys that must never appear on a user-branch commit.
pub const RESERVED_TRAILERS: &[&str] = &[
    TRAILER_SESSION,
    TRAILER_STRATEGY,
    TRAILER_AGENT,
    TRAILER_SOURCE_REF,
    TRAILER_TEMPORARY,
    TRAILER_TOOL_USE,
    TRAILER_SEQUENCE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_key_not_reserved() {
        assert!(!RESERVED_TRAILERS.contains(&TRAILER_CHECKPOINT));
    }

    #[test]
    fn test_reserved_keys_unique() {
        let mut seen = std::collections::HashSet::new();
        for key in RESERVED_TRAILERS {
            assert!(seen.insert(*key), "duplicate reserved trailer {key}");
        }
    }
}
