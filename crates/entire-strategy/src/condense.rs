//! Condensation: promote a session's temporary chain into one permanent
//! checkpoint.

use crate::strategy::Strategy;
use crate::transcript;
use anyhow::{Context, Result};
use chrono::Utc;
use entire_core::CheckpointId;
use entire_git::trailers::{append_trailer, checkpoint_id, strip_reserved_trailers};
use entire_git::{Author, Repo};
use entire_session::{SessionState, SessionStore};
use entire_store::{
    ArchivedSession, CheckpointMetadata, CommittedCheckpoint, CommittedStore, InitialAttribution,
    ShadowStore,
};

/// Session-scoped metadata blob path on a shadow checkpoint.
fn metadata_path(session_id: &str, file: &str) -> String {
    format!(".entire/metadata/{session_id}/{file}")
}

/// Transcript line count for a session, zero when the file is unreadable.
fn transcript_line_total(state: &SessionState) -> usize {
    transcript::read(&state.transcript_path)
        .map(|text| transcript::line_count(&text))
        .unwrap_or(0)
}

/// Read a metadata blob from the shadow tip, empty when absent.
fn read_tip_metadata(repo: &Repo, tip: Option<&str>, session_id: &str, file: &str) -> String {
    let Some(tip) = tip else {
        return String::new();
    };
    match repo.read_blob(tip, &metadata_path(session_id, file)) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

/// Successful condensation: the checkpoint id and the user commit it ended
/// up attached to (the amend rewrites HEAD's sha).
#[derive(Debug, Clone)]
pub(crate) struct CondenseResult {
    pub id: CheckpointId,
    pub head: String,
}

/// One condensation attempt.
pub(crate) struct Condensation<'a> {
    pub repo: &'a Repo,
    pub sessions: &'a SessionStore,
    pub state: &'a mut SessionState,
    /// The user commit this condensation attaches to. Equal to HEAD except
    /// in tests.
    pub target_commit: &'a str,
    pub strategy: Strategy,
    pub author: Author,
    /// Whether to attempt injecting the checkpoint trailer into HEAD.
    pub amend_head: bool,
}

impl Condensation<'_> {
    /// Run the condensation pipeline end to end. On success the session
    /// state is updated in memory (caller persists); on failure it is left
    /// untouched so the next commit retries.
    pub fn run(mut self) -> Result<CondenseResult> {
        let id = self
            .state
            .pending_checkpoint_id
            .clone()
            .unwrap_or_else(|| {
                CheckpointId::derive(
                    &self.state.session_id,
                    &self.state.base_commit,
                    self.state.condensed_transcript_lines,
                )
            });

        let transcript_text = transcript::read(&self.state.transcript_path)?;
        let total_lines = transcript::line_count(&transcript_text);
        let cursor = self.state.condensed_transcript_lines.min(total_lines);
        let slice = transcript::slice_from(&transcript_text, cursor);

        let shadow = ShadowStore::new(self.repo);
        let tip = shadow.tip(&self.state.base_commit)?;
        let session_id = self.state.session_id.clone();
        let prompts = read_tip_metadata(self.repo, tip.as_deref(), &session_id, "prompt.txt");
        let summary_text = read_tip_metadata(self.repo, tip.as_deref(), &session_id, "summary.txt");
        let context = read_tip_metadata(self.repo, tip.as_deref(), &session_id, "context.md");

        let (archived_sessions, archived_states) = self.collect_archived(tip.as_deref())?;

        let user = self.state.user_attribution_totals();
        let total = self
            .repo
            .diff_tree_lines(&self.state.attribution_base_commit, self.target_commit)?;
        let attribution = InitialAttribution {
            total_committed: total.added,
            user_added: user.user_added,
            user_removed: user.user_removed,
            agent_added: total.added.saturating_sub(user.user_added),
            agent_removed: total.removed.saturating_sub(user.user_removed),
            user_added_per_file: user.per_file_user_added,
        };

        let mut files_touched = self.state.files_touched.clone();
        for state in &archived_states {
            files_touched.extend(state.files_touched.iter().cloned());
        }
        files_touched.sort_unstable();
        files_touched.dedup();

        let mut session_ids = vec![session_id.clone()];
        session_ids.extend(archived_states.iter().map(|s| s.session_id.clone()));

        let checkpoint = CommittedCheckpoint {
            metadata: CheckpointMetadata {
                checkpoint_id: id.clone(),
                session_id: session_id.clone(),
                session_count: session_ids.len(),
                session_ids,
                agent: self.state.agent.clone(),
                strategy: self.strategy.name().to_string(),
                created_at: Utc::now(),
                files_touched,
                transcript_lines_at_start: cursor,
                summary: None,
                token_usage: self.state.token_usage,
                initial_attribution: Some(attribution),
            },
            transcript: slice,
            prompts,
            summary_text,
            context,
            archived_sessions,
        };

        let committed = CommittedStore::new(self.repo);
        committed
            .write_committed(&checkpoint, &self.author)
            .context("Failed to write permanent checkpoint")?;

        // Archived sessions are consumed by this checkpoint: ended ones are
        // removed outright, live ones have their cursors advanced so they
        // are not condensed twice.
        for mut other in archived_states {
            let result = if other.phase == entire_session::Phase::Ended {
                self.sessions.clear(&other.session_id)
            } else {
                other.condensed_transcript_lines = other
                    .condensed_transcript_lines
                    .max(transcript_line_total(&other));
                other.last_checkpoint_id = Some(id.clone());
                other.attribution_base_commit = self.target_commit.to_string();
                other.prompt_attributions.clear();
                other.step_count = 0;
                self.sessions.save(&other)
            };
            if let Err(e) = result {
                tracing::warn!(
                    session_id = %other.session_id,
                    error = %e,
                    "Failed to update archived session state"
                );
            }
        }

        let final_head = if self.amend_head {
            self.inject_trailer(&id)
                .unwrap_or_else(|| self.target_commit.to_string())
        } else {
            self.target_commit.to_string()
        };

        self.state.mark_condensed(id.clone(), total_lines);
        // Converge the attribution baseline on the commit this condensation
        // attached to; the caller's base-commit update lands on the same sha.
        self.state.attribution_base_commit = final_head.clone();
        tracing::info!(
            session_id = %session_id,
            checkpoint_id = %id,
            "Condensed session checkpoints"
        );
        Ok(CondenseResult {
            id,
            head: final_head,
        })
    }

    /// Other sessions whose shadow chains fed into this commit (same
    /// `(base, worktree)`, uncondensed transcript content) get rolled up
    /// as archived sessions. A user commit carries at most one checkpoint
    /// trailer, so everything that reached it condenses under one id.
    fn collect_archived(
        &self,
        tip: Option<&str>,
    ) -> Result<(Vec<ArchivedSession>, Vec<SessionState>)> {
        let mut archived = Vec::new();
        let mut states = Vec::new();
        for other in self
            .sessions
            .find_by_base_commit(&self.state.base_commit, &self.state.worktree_id)?
        {
            if other.session_id == self.state.session_id {
                continue;
            }
            let Ok(text) = transcript::read(&other.transcript_path) else {
                tracing::warn!(
                    session_id = %other.session_id,
                    "Skipping archived session with missing transcript"
                );
                continue;
            };
            let cursor = other
                .condensed_transcript_lines
                .min(transcript::line_count(&text));
            let slice = transcript::slice_from(&text, cursor);
            if slice.is_empty() {
                continue;
            }
            archived.push(ArchivedSession {
                session_id: other.session_id.clone(),
                transcript: slice,
                prompts: read_tip_metadata(self.repo, tip, &other.session_id, "prompt.txt"),
            });
            states.push(other);
        }
        Ok((archived, states))
    }

    /// Step 6: ensure HEAD carries the checkpoint trailer and nothing else
    /// of ours. Failure is non-fatal: the permanent checkpoint is already
    /// written and reachable by id. Returns the amended HEAD sha when the
    /// commit was rewritten.
    fn inject_trailer(&self, id: &CheckpointId) -> Option<String> {
        let result = (|| -> Result<Option<String>> {
            let head = self.repo.head()?;
            if head != self.target_commit {
                tracing::debug!("HEAD moved past the target commit; skipping trailer amend");
                return Ok(None);
            }
            let message = self.repo.commit_message(&head)?;
            let mut rewritten = strip_reserved_trailers(&message).unwrap_or_else(|| message.clone());
            let already_linked = checkpoint_id(&rewritten).is_some_and(|existing| existing == *id);
            if !already_linked {
                rewritten = append_trailer(
                    &rewritten,
                    entire_core::trailer::TRAILER_CHECKPOINT,
                    id.as_str(),
                );
            }
            if rewritten == message {
                return Ok(None);
            }
            Ok(Some(self.repo.rewrite_head_message(&rewritten)?))
        })();
        match result {
            Ok(amended) => amended,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to inject checkpoint trailer (non-fatal)");
                None
            }
        }
    }
}
