//! Typed hook events.
//!
//! Agent-specific payload parsing lives outside this crate; adapters hand
//! the orchestrator these already-shaped events (deserializable from the
//! generic JSON the CLI reads on stdin).

use entire_core::TokenUsage;
use entire_git::Author;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Commit identity carried on hook payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorSpec {
    pub name: String,
    pub email: String,
}

impl AuthorSpec {
    pub fn to_author(&self) -> Author {
        Author::new(self.name.clone(), self.email.clone())
    }
}

/// The user submitted a prompt; a turn is starting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSubmitEvent {
    pub session_id: String,

    /// Agent name, recorded verbatim on state and checkpoints.
    pub agent: String,

    pub worktree_path: PathBuf,

    pub transcript_path: PathBuf,

    /// The prompt text, when the adapter extracted it.
    #[serde(default)]
    pub prompt: Option<String>,
}

/// A turn finished; the working copy reflects the agent's edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEndEvent {
    pub session_id: String,

    pub transcript_path: PathBuf,

    #[serde(default)]
    pub modified_files: Vec<String>,

    #[serde(default)]
    pub new_files: Vec<String>,

    #[serde(default)]
    pub deleted_files: Vec<String>,

    /// Full transcript text; read from `transcript_path` when absent.
    #[serde(default)]
    pub transcript_text: Option<String>,

    /// User prompts of this turn, pre-extracted by the adapter.
    #[serde(default)]
    pub prompts: Vec<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub token_usage: Option<TokenUsage>,

    #[serde(default)]
    pub author: Option<AuthorSpec>,
}

impl TurnEndEvent {
    /// Modified ∪ new ∪ deleted, the include set for non-first checkpoints.
    pub fn touched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .modified_files
            .iter()
            .chain(&self.new_files)
            .chain(&self.deleted_files)
            .cloned()
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }
}

/// The user ran `git commit` (fired by the post-commit hook). The
/// orchestrator discovers which sessions match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitCommitEvent {
    /// New HEAD; resolved from the repository when absent.
    #[serde(default)]
    pub new_head: Option<String>,
}

/// The agent session ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndEvent {
    pub session_id: String,
}

/// A sub-agent produced an intermediate checkpoint mid-turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentCheckpointEvent {
    pub session_id: String,

    pub tool_use_id: String,

    /// Monotonic sequence of increments within one tool use.
    #[serde(default)]
    pub increment_sequence: u32,

    #[serde(default)]
    pub modified_files: Vec<String>,

    #[serde(default)]
    pub transcript_slice: Option<String>,

    #[serde(default)]
    pub author: Option<AuthorSpec>,
}
