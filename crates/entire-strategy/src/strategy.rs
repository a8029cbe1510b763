//! Strategy variants.
//!
//! A sum type, not a trait object: the orchestrator matches on the variant
//! where behavior differs. Both variants share the session-support surface
//! (initialize, save-changes, condense, rewind) exposed through
//! [`crate::Orchestrator`].

use entire_core::StrategyKind;

/// Checkpointing strategy in effect for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// User-driven: temporary checkpoints accumulate per turn; condensation
    /// waits for the user's `git commit` (or runs deferred after a mid-turn
    /// commit).
    ManualCommit,
    /// Agent-driven: every turn end condenses immediately.
    AutoCommit,
}

impl Strategy {
    pub fn from_kind(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::ManualCommit => Strategy::ManualCommit,
            StrategyKind::AutoCommit => Strategy::AutoCommit,
        }
    }

    /// Wire name used in trailers and metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::ManualCommit => StrategyKind::ManualCommit.as_str(),
            Strategy::AutoCommit => StrategyKind::AutoCommit.as_str(),
        }
    }

    /// Whether turn end triggers an immediate condensation.
    pub fn condenses_at_turn_end(&self) -> bool {
        matches!(self, Strategy::AutoCommit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(Strategy::ManualCommit.name(), "manual-commit");
        assert_eq!(Strategy::AutoCommit.name(), "auto-commit");
    }

    #[test]
    fn test_from_kind() {
        assert_eq!(
            Strategy::from_kind(StrategyKind::ManualCommit),
            Strategy::ManualCommit
        );
        assert_eq!(
            Strategy::from_kind(StrategyKind::AutoCommit),
            Strategy::AutoCommit
        );
    }

    #[test]
    fn test_condensation_timing() {
        assert!(!Strategy::ManualCommit.condenses_at_turn_end());
        assert!(Strategy::AutoCommit.condenses_at_turn_end());
    }
}
