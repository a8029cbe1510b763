//! Two-layer checkpoint storage.
//!
//! Temporary checkpoints are commits chained on worktree-scoped shadow
//! branches (`entire/<base-short>[/<worktree-id>]`); permanent checkpoints
//! are content-addressed shards on the single metadata branch
//! (`entire/checkpoints/v1`). Condensation promotes the former into the
//! latter.

pub mod committed;
pub mod metadata;
pub mod shadow;

/// Attempts before giving up on a compare-and-swap ref advance.
pub(crate) const MAX_REF_RETRIES: usize = 3;

/// update-ref's "must not exist" sentinel.
pub(crate) const ZERO_OID: &str = "0000000000000000000000000000000000000000";

pub use committed::{ArchivedSession, CommittedCheckpoint, CommittedStore};
pub use metadata::{
    CheckpointMetadata, CodeFinding, InitialAttribution, Learnings, SummaryStructure, TokenUsage,
};
pub use shadow::{ShadowStore, TemporaryCheckpoint, TemporaryWrite, shadow_branch, shadow_ref};
