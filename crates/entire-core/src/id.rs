//! Checkpoint identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A stable checkpoint identifier: twelve lowercase hex characters.
///
/// Derived from SHA-256 over `(session id, base commit, transcript cursor)`,
/// so retrying the same condensation attempt reproduces the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

/// Length of the hex representation.
pub const CHECKPOINT_ID_LEN: usize = 12;

impl CheckpointId {
    /// Derive the deterministic id for a condensation attempt.
    pub fn derive(session_id: &str, base_commit: &str, transcript_cursor: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        hasher.update(base_commit.as_bytes());
        hasher.update(transcript_cursor.to_string().as_bytes());
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(CHECKPOINT_ID_LEN);
        for byte in digest.iter().take(CHECKPOINT_ID_LEN / 2) {
            hex.push_str(&format!("{byte:02x}"));
        }
        CheckpointId(hex)
    }

    /// Parse a candidate id. Returns `None` unless the value is exactly
    /// twelve lowercase hex characters; trailer parsers treat anything
    /// else as if no id were present.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == CHECKPOINT_ID_LEN && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            Some(CheckpointId(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shard prefix: the first two hex characters.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    /// Shard remainder: the last ten hex characters.
    pub fn rest(&self) -> &str {
        &self.0[2..]
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
