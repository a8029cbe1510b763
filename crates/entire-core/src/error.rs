use std::path::PathBuf;

/// Typed error kinds the hook boundary distinguishes.
///
/// Everything else travels as `anyhow::Error` with context; these variants
/// exist because the orchestrator's policy differs per kind (hard failure,
/// silent skip, retry-on-next-commit).
#[derive(thiserror::Error, Debug)]
pub enum EntireError {
    #[error("Not a git repository (or any parent): {0}")]
    NotARepo(PathBuf),

    #[error("Repository has no commits yet; checkpointing requires at least one")]
    EmptyRepo,

    #[error("Invalid session ID '{0}': expected [A-Za-z0-9_-]+, max 128 chars")]
    InvalidSessionId(String),

    #[error("No checkpoint '{0}' on the metadata branch")]
    CheckpointNotFound(String),

    #[error("Shadow branch '{branch}' is corrupt: {reason}")]
    ShadowBranchCorrupt { branch: String, reason: String },

    #[error("Shadow branch '{branch}' belongs to session '{found}', not '{expected}'")]
    SessionIdConflict {
        branch: String,
        expected: String,
        found: String,
    },

    #[error("Transcript not found at {0}")]
    TranscriptMissing(PathBuf),

    #[error("Condensation failed: {0}")]
    CondensationFailed(String),
}

impl EntireError {
    /// Whether this kind may propagate out of a hook as a non-zero exit.
    ///
    /// Hooks must never fail the user's git operation; the only exceptions
    /// are misuse kinds that would corrupt state if ignored.
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            EntireError::NotARepo(_) | EntireError::EmptyRepo | EntireError::InvalidSessionId(_)
        )
    }
}
