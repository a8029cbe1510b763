//! Permanent-checkpoint metadata (`metadata.json` schema).

use chrono::{DateTime, Utc};
use entire_core::CheckpointId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contents of `metadata.json` in a checkpoint shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMetadata {
    pub checkpoint_id: CheckpointId,

    /// Primary session for this condensation.
    pub session_id: String,

    /// All sessions rolled into this checkpoint, primary first.
    pub session_ids: Vec<String>,

    pub session_count: usize,

    pub agent: String,

    pub strategy: String,

    pub created_at: DateTime<Utc>,

    /// Repository-relative paths the sessions touched.
    #[serde(default)]
    pub files_touched: Vec<String>,

    /// Transcript cursor at the start of the condensed slice.
    #[serde(default)]
    pub transcript_lines_at_start: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryStructure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_attribution: Option<InitialAttribution>,
}

/// Structured session summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryStructure {
    #[serde(default)]
    pub intent: String,

    #[serde(default)]
    pub outcome: String,

    #[serde(default)]
    pub learnings: Learnings,

    #[serde(default)]
    pub friction: Vec<String>,

    #[serde(default)]
    pub open_items: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Learnings {
    #[serde(default)]
    pub repo: Vec<String>,

    #[serde(default)]
    pub code: Vec<CodeFinding>,

    #[serde(default)]
    pub workflow: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeFinding {
    pub path: String,

    pub line: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,

    pub finding: String,
}

pub use entire_core::TokenUsage;

/// User-vs-agent line split between the attribution base and the committed
/// head. Satisfies `total = user + agent` per direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitialAttribution {
    /// Total lines added between attribution base and head.
    pub total_committed: usize,

    pub user_added: usize,

    pub user_removed: usize,

    pub agent_added: usize,

    pub agent_removed: usize,

    #[serde(default)]
    pub user_added_per_file: BTreeMap<String, usize>,
}
