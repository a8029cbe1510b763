//! Session state record.

use crate::phase::Phase;
use chrono::{DateTime, Utc};
use entire_core::{CheckpointId, TokenUsage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// User-authored line churn captured at prompt submit: everything that
/// changed while no turn was live belongs to the user. Summed at
/// condensation time; agent numbers are derived as `total − user`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptAttribution {
    #[serde(default)]
    pub user_added: usize,

    #[serde(default)]
    pub user_removed: usize,

    #[serde(default)]
    pub per_file_user_added: BTreeMap<String, usize>,
}

/// Durable record of one session, stored as
/// `<git-common-dir>/entire-sessions/<session-id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    /// Agent-provided, path-safe id.
    pub session_id: String,

    #[serde(default)]
    pub phase: Phase,

    /// Commit the shadow branch hangs off. Always resolvable from the
    /// session's worktree head.
    pub base_commit: String,

    /// Baseline for attribution diffs. Set once at session start and
    /// advanced only by a successful condensation, so it lags
    /// `base_commit` across mid-turn commits.
    pub attribution_base_commit: String,

    /// Absolute path of the session's worktree.
    pub worktree_path: PathBuf,

    /// Empty for the main worktree, otherwise the internal worktree
    /// directory name (stable across `git worktree move`).
    #[serde(default)]
    pub worktree_id: String,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    pub last_interaction_at: DateTime<Utc>,

    /// Temporary checkpoints written since the last condensation.
    #[serde(default)]
    pub step_count: u32,

    /// Transcript cursor: lines already condensed.
    #[serde(default)]
    pub condensed_transcript_lines: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_checkpoint_id: Option<CheckpointId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_id: Option<CheckpointId>,

    /// Repository-relative paths touched by the agent this session.
    #[serde(default)]
    pub files_touched: Vec<String>,

    /// Untracked worktree files snapshotted at session start; rewind
    /// preserves them.
    #[serde(default)]
    pub untracked_files_at_start: Vec<String>,

    #[serde(default)]
    pub concurrent_warning_shown: bool,

    pub agent: String,

    pub transcript_path: PathBuf,

    #[serde(default)]
    pub prompt_attributions: Vec<PromptAttribution>,

    /// Token totals accumulated since the last condensation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl SessionState {
    /// Fresh record for a session starting now at `base_commit`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        base_commit: String,
        worktree_path: PathBuf,
        worktree_id: String,
        agent: String,
        transcript_path: PathBuf,
        untracked_files_at_start: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        SessionState {
            session_id,
            phase: Phase::Active,
            attribution_base_commit: base_commit.clone(),
            base_commit,
            worktree_path,
            worktree_id,
            started_at: now,
            ended_at: None,
            last_interaction_at: now,
            step_count: 0,
            condensed_transcript_lines: 0,
            pending_checkpoint_id: None,
            last_checkpoint_id: None,
            files_touched: Vec::new(),
            untracked_files_at_start,
            concurrent_warning_shown: false,
            agent,
            transcript_path,
            prompt_attributions: Vec::new(),
            token_usage: None,
        }
    }

    /// Fold a turn's token totals into the running sum.
    pub fn record_token_usage(&mut self, usage: &TokenUsage) {
        self.token_usage.get_or_insert_with(TokenUsage::default).add(usage);
    }

    /// Record paths the agent touched, keeping the list sorted and unique.
    pub fn record_files_touched<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.files_touched.extend(paths);
        self.files_touched.sort_unstable();
        self.files_touched.dedup();
    }

    /// Sum of recorded user-authored additions/removals, with the per-file
    /// breakdown merged.
    pub fn user_attribution_totals(&self) -> PromptAttribution {
        let mut totals = PromptAttribution::default();
        for attribution in &self.prompt_attributions {
            totals.user_added += attribution.user_added;
            totals.user_removed += attribution.user_removed;
            for (path, added) in &attribution.per_file_user_added {
                *totals.per_file_user_added.entry(path.clone()).or_default() += added;
            }
        }
        totals
    }

    /// Bookkeeping after a condensation succeeded: advance the cursor,
    /// converge the attribution base onto the current base, reset the
    /// per-condensation counters.
    pub fn mark_condensed(&mut self, checkpoint_id: CheckpointId, transcript_lines: usize) {
        self.condensed_transcript_lines = transcript_lines;
        self.last_checkpoint_id = Some(checkpoint_id);
        self.attribution_base_commit = self.base_commit.clone();
        self.step_count = 0;
        self.pending_checkpoint_id = None;
        self.prompt_attributions.clear();
        self.token_usage = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionState {
        SessionState::new(
            "s-1".into(),
            "a".repeat(40),
            PathBuf::from("/work/repo"),
            String::new(),
            "claude-code".into(),
            PathBuf::from("/work/transcript.jsonl"),
            vec![".config.local".into()],
            Utc::now(),
        )
    }

    #[test]
    fn test_new_session_defaults() {
        let state = sample();
        assert_eq!(state.phase, Phase::Active);
        assert_eq!(state.attribution_base_commit, state.base_commit);
        assert_eq!(state.step_count, 0);
        assert_eq!(state.condensed_transcript_lines, 0);
        assert!(state.pending_checkpoint_id.is_none());
        assert!(!state.concurrent_warning_shown);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut state = sample();
        state.pending_checkpoint_id = CheckpointId::parse("0123456789ab");
        state.prompt_attributions.push(PromptAttribution {
            user_added: 3,
            user_removed: 1,
            per_file_user_added: BTreeMap::from([("a.rs".to_string(), 3)]),
        });
        let json = serde_json::to_string_pretty(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_record_files_touched_dedupes_sorted() {
        let mut state = sample();
        state.record_files_touched(vec!["b.rs".into(), "a.rs".into()]);
        state.record_files_touched(vec!["a.rs".into(), "c.rs".into()]);
        assert_eq!(state.files_touched, vec!["a.rs", "b.rs", "c.rs"]);
    }

    #[test]
    fn test_user_attribution_totals_merge() {
        let mut state = sample();
        state.prompt_attributions = vec![
            PromptAttribution {
                user_added: 2,
                user_removed: 1,
                per_file_user_added: BTreeMap::from([("a.rs".to_string(), 2)]),
            },
            PromptAttribution {
                user_added: 5,
                user_removed: 0,
                per_file_user_added: BTreeMap::from([
                    ("a.rs".to_string(), 1),
                    ("b.rs".to_string(), 4),
                ]),
            },
        ];
        let totals = state.user_attribution_totals();
        assert_eq!(totals.user_added, 7);
        assert_eq!(totals.user_removed, 1);
        assert_eq!(totals.per_file_user_added.get("a.rs"), Some(&3));
        assert_eq!(totals.per_file_user_added.get("b.rs"), Some(&4));
    }

    #[test]
    fn test_mark_condensed_converges_attribution_base() {
        let mut state = sample();
        state.base_commit = "b".repeat(40);
        state.step_count = 4;
        state.condensed_transcript_lines = 10;
        state.pending_checkpoint_id = CheckpointId::parse("0123456789ab");
        state.prompt_attributions.push(PromptAttribution::default());

        let id = CheckpointId::parse("ab0123456789").unwrap();
        state.mark_condensed(id.clone(), 25);

        assert_eq!(state.condensed_transcript_lines, 25);
        assert_eq!(state.last_checkpoint_id, Some(id));
        assert_eq!(state.attribution_base_commit, state.base_commit);
        assert_eq!(state.step_count, 0);
        assert!(state.pending_checkpoint_id.is_none());
        assert!(state.prompt_attributions.is_empty());
    }

    #[test]
    fn test_token_usage_accumulates_and_resets() {
        let mut state = sample();
        state.record_token_usage(&TokenUsage {
            input: 100,
            output: 40,
            cache_read: 0,
            api_calls: 2,
        });
        state.record_token_usage(&TokenUsage {
            input: 50,
            output: 10,
            cache_read: 5,
            api_calls: 1,
        });
        let usage = state.token_usage.unwrap();
        assert_eq!(usage.input, 150);
        assert_eq!(usage.api_calls, 3);

        state.mark_condensed(CheckpointId::parse("0123456789ab").unwrap(), 1);
        assert!(state.token_usage.is_none());
    }

    #[test]
    fn test_deserialize_with_missing_optionals() {
        // Fields added over time default cleanly when absent.
        let json = format!(
            r#"{{
                "session_id": "s",
                "base_commit": "{b}",
                "attribution_base_commit": "{b}",
                "worktree_path": "/w",
                "started_at": "2026-07-01T00:00:00Z",
                "last_interaction_at": "2026-07-01T00:00:00Z",
                "agent": "claude-code",
                "transcript_path": "/t.jsonl"
            }}"#,
            b = "a".repeat(40)
        );
        let state: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.phase, Phase::Active);
        assert_eq!(state.worktree_id, "");
        assert!(state.files_touched.is_empty());
        assert!(state.prompt_attributions.is_empty());
    }
}
