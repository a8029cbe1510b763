//! Hook entry points and the post-commit decision procedure.

use crate::condense::{Condensation, CondenseResult};
use crate::events::{
    GitCommitEvent, PromptSubmitEvent, SessionEndEvent, SubAgentCheckpointEvent, TurnEndEvent,
};
use crate::rewind::{self, RewindPlan};
use crate::strategy::Strategy;
use crate::transcript;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use entire_config::Config;
use entire_core::{CheckpointId, EntireError, Registry, validate_session_id};
use entire_git::trailers::checkpoint_id;
use entire_git::{Author, Repo};
use entire_session::{Action, Event, Phase, SessionState, SessionStore, transition};
use entire_store::{ShadowStore, TemporaryWrite};

/// Binds git layer, checkpoint store, and session state behind the hook
/// callbacks. One instance per hook invocation; all state lives on disk.
pub struct Orchestrator<'a> {
    repo: Repo,
    config: Config,
    registry: &'a Registry,
    sessions: SessionStore,
}

/// What happened while executing a transition's actions.
#[derive(Debug, Default)]
struct ActionOutcome {
    condense_failed: bool,
    discard_session: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(repo: Repo, config: Config, registry: &'a Registry) -> Self {
        let sessions = SessionStore::new(repo.common_dir());
        Orchestrator {
            repo,
            config,
            registry,
            sessions,
        }
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn strategy(&self) -> Strategy {
        Strategy::from_kind(self.config.strategy)
    }

    fn author(&self) -> Author {
        Author::new(
            self.config.author_name.clone(),
            self.config.author_email.clone(),
        )
    }

    fn shadow(&self) -> ShadowStore<'_> {
        ShadowStore::new(&self.repo)
    }

    /// Live sessions (other than `session_id`) based at the current HEAD in
    /// this worktree.
    pub fn has_other_active_session(&self, session_id: &str) -> Result<Vec<String>> {
        let head = self.repo.head()?;
        Ok(self
            .sessions
            .find_by_base_commit(&head, &self.repo.worktree_id())?
            .into_iter()
            .filter(|s| s.session_id != session_id && s.phase != Phase::Ended)
            .map(|s| s.session_id)
            .collect())
    }

    // ── PromptSubmit ─────────────────────────────────────────────────

    pub fn handle_prompt_submit(&self, event: &PromptSubmitEvent) -> Result<()> {
        validate_session_id(&event.session_id)?;
        if !self.config.enabled {
            return Ok(());
        }
        if self.repo.rebase_or_merge_in_progress() {
            tracing::debug!("Rebase or merge in progress; ignoring prompt-submit");
            return Ok(());
        }
        let head = self.repo.head()?;

        let existing = self.sessions.load(&event.session_id)?;
        let Some(step) = transition(existing.as_ref().map(|s| s.phase), Event::PromptSubmit)
        else {
            return Ok(());
        };

        let mut state = match existing {
            Some(state) => {
                if state.phase == Phase::Ended {
                    tracing::warn!(
                        session_id = %event.session_id,
                        "Prompt on an ended session ignored; start a new session id"
                    );
                    return Ok(());
                }
                state
            }
            None => self.create_session(event, &head)?,
        };

        // Edits made while no turn was live are the user's.
        self.record_user_edits(&mut state)?;

        for action in &step.actions {
            if *action == Action::ClearPending {
                state.pending_checkpoint_id = None;
            }
        }
        state.phase = step.next;
        state.last_interaction_at = Utc::now();
        self.sessions.save(&state)?;
        Ok(())
    }

    fn create_session(&self, event: &PromptSubmitEvent, head: &str) -> Result<SessionState> {
        let shadow = self.shadow();
        if let Some(tip_session) = shadow.tip_session(head)?
            && tip_session != event.session_id
            && self.sessions.load(&tip_session)?.is_none()
        {
            // The branch tip belongs to a session we have no record of:
            // refusing beats silently interleaving with a ghost.
            return Err(EntireError::SessionIdConflict {
                branch: entire_store::shadow_branch(head, &self.repo.worktree_id()),
                expected: event.session_id.clone(),
                found: tip_session,
            }
            .into());
        }

        let mut state = SessionState::new(
            event.session_id.clone(),
            head.to_string(),
            self.repo.workdir().to_path_buf(),
            self.repo.worktree_id(),
            event.agent.clone(),
            event.transcript_path.clone(),
            self.repo.untracked_files()?,
            Utc::now(),
        );

        let others = self.has_other_active_session(&event.session_id)?;
        if !others.is_empty() && !state.concurrent_warning_shown {
            tracing::warn!(
                session_id = %event.session_id,
                concurrent = ?others,
                "Another session is active on the same base commit; checkpoints will share a shadow branch"
            );
            state.concurrent_warning_shown = true;
        }
        Ok(state)
    }

    fn record_user_edits(&self, state: &mut SessionState) -> Result<()> {
        let baseline = match self.shadow().tip(&state.base_commit) {
            Ok(Some(tip)) => tip,
            Ok(None) => state.base_commit.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping user-edit attribution (shadow unreadable)");
                return Ok(());
            }
        };
        let diff = self.repo.diff_workdir_lines(&baseline)?;
        if !diff.is_empty() {
            state.prompt_attributions.push(entire_session::PromptAttribution {
                user_added: diff.added,
                user_removed: diff.removed,
                per_file_user_added: diff.per_file_added,
            });
        }
        Ok(())
    }

    // ── TurnEnd (SaveChanges) ────────────────────────────────────────

    pub fn handle_turn_end(&self, event: &TurnEndEvent) -> Result<()> {
        validate_session_id(&event.session_id)?;
        if !self.config.enabled {
            return Ok(());
        }
        if self.repo.rebase_or_merge_in_progress() {
            tracing::debug!("Rebase or merge in progress; ignoring turn-end");
            return Ok(());
        }

        let Some(mut state) = self.sessions.load(&event.session_id)? else {
            tracing::warn!(session_id = %event.session_id, "Turn end for unknown session");
            return Ok(());
        };
        if state.phase == Phase::Ended {
            return Ok(());
        }

        let transcript_text = match &event.transcript_text {
            Some(text) => text.clone(),
            None => match transcript::read(&event.transcript_path) {
                Ok(text) => text,
                Err(e)
                    if matches!(
                        e.downcast_ref::<EntireError>(),
                        Some(EntireError::TranscriptMissing(_))
                    ) =>
                {
                    tracing::warn!(
                        path = %event.transcript_path.display(),
                        "Transcript missing; skipping checkpoint"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
        };

        let author = event
            .author
            .as_ref()
            .map(|a| a.to_author())
            .unwrap_or_else(|| self.author());

        self.save_changes(&mut state, event, &transcript_text, &author)?;

        let Some(step) = transition(Some(state.phase), Event::TurnEnd) else {
            return Ok(());
        };
        let mut outcome = ActionOutcome::default();
        for action in &step.actions {
            match action {
                Action::CondenseDeferred => {
                    let target = state.base_commit.clone();
                    match self.condense_if_new_content(&mut state, &target, true) {
                        Ok(Some(result)) => state.base_commit = result.head,
                        Ok(None) => {}
                        Err(e) => {
                            outcome.condense_failed = true;
                            tracing::warn!(error = %e, "Deferred condensation failed; will retry on next commit");
                        }
                    }
                }
                Action::ClearPending => {
                    if !outcome.condense_failed {
                        state.pending_checkpoint_id = None;
                    }
                }
                other => tracing::debug!(?other, "Unexpected turn-end action"),
            }
        }
        state.phase = step.next;

        if self.strategy().condenses_at_turn_end() {
            let target = state.base_commit.clone();
            if let Err(e) = self.condense_if_new_content(&mut state, &target, false) {
                tracing::warn!(error = %e, "Auto-commit condensation failed");
            }
        }

        state.last_interaction_at = Utc::now();
        self.sessions.save(&state)?;
        Ok(())
    }

    /// Write the turn's temporary checkpoint.
    fn save_changes(
        &self,
        state: &mut SessionState,
        event: &TurnEndEvent,
        transcript_text: &str,
        author: &Author,
    ) -> Result<()> {
        let shadow = self.shadow();
        let is_first = state.step_count == 0;

        let previous_prompts = match shadow.tip(&state.base_commit)? {
            Some(tip) => self
                .repo
                .read_blob(
                    &tip,
                    &format!(".entire/metadata/{}/prompt.txt", state.session_id),
                )
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default(),
            None => String::new(),
        };
        let prompts = transcript::append_prompts(&previous_prompts, &event.prompts);

        let metadata_files: Vec<(String, Vec<u8>)> = vec![
            ("full.jsonl".to_string(), transcript_text.as_bytes().to_vec()),
            ("prompt.txt".to_string(), prompts.into_bytes()),
            (
                "summary.txt".to_string(),
                event.summary.clone().unwrap_or_default().into_bytes(),
            ),
            (
                "context.md".to_string(),
                event.context.clone().unwrap_or_default().into_bytes(),
            ),
        ];

        let touched = event.touched_paths();
        let step = state.step_count + 1;
        shadow.write_temporary(&TemporaryWrite {
            session_id: &state.session_id,
            base_commit: &state.base_commit,
            included_paths: &touched,
            snapshot_all: is_first,
            metadata_files: &metadata_files,
            subject: &format!("Checkpoint {step} for session {}", state.session_id),
            author,
            tool_use_id: None,
            sequence: None,
        })?;

        state.step_count = step;
        state.record_files_touched(touched);
        if let Some(usage) = &event.token_usage {
            state.record_token_usage(usage);
        }
        Ok(())
    }

    /// Shared condensation gate: skip when the transcript cursor already
    /// covers the transcript, otherwise run and update state in memory.
    fn condense_if_new_content(
        &self,
        state: &mut SessionState,
        target_commit: &str,
        amend_head: bool,
    ) -> Result<Option<CondenseResult>> {
        let text = transcript::read(&state.transcript_path)?;
        if state.condensed_transcript_lines >= transcript::line_count(&text) {
            tracing::debug!(
                session_id = %state.session_id,
                "No new transcript content; skipping condensation"
            );
            return Ok(None);
        }
        let result = Condensation {
            repo: &self.repo,
            sessions: &self.sessions,
            state,
            target_commit,
            strategy: self.strategy(),
            author: self.author(),
            amend_head,
        }
        .run()?;
        Ok(Some(result))
    }

    // ── PostCommit ───────────────────────────────────────────────────

    /// The critical decision procedure: for every live session whose
    /// `(base, worktree)` matches the commit before HEAD, advance the phase
    /// machine with `GitCommit` and execute the resulting actions.
    pub fn handle_post_commit(&self, event: &GitCommitEvent) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if self.repo.rebase_or_merge_in_progress() {
            tracing::debug!("Rebase or merge in progress; ignoring post-commit");
            return Ok(());
        }

        let new_head = match &event.new_head {
            Some(head) => head.clone(),
            None => self.repo.head()?,
        };
        let Some(old_base) = self.repo.first_parent(&new_head)? else {
            return Ok(());
        };

        let trailer_id = checkpoint_id(&self.repo.commit_message(&new_head)?);

        // Sessions with condensable content go first: the first condensation
        // archives the others' uncondensed transcripts (one trailer per user
        // commit) and may amend HEAD, which later iterations must see.
        let mut candidates = self
            .sessions
            .find_by_base_commit(&old_base, &self.repo.worktree_id())?;
        candidates.sort_by_key(|s| (!self.has_uncondensed_content(s), s.session_id.clone()));
        let ids: Vec<String> = candidates.into_iter().map(|s| s.session_id).collect();

        let mut current_head = new_head;
        for session_id in ids {
            // Re-load: an earlier condensation may have archived or cleared
            // this session.
            let Some(state) = self.sessions.load(&session_id)? else {
                continue;
            };
            if let Err(e) =
                self.advance_session_over_commit(state, &old_base, &mut current_head, &trailer_id)
            {
                tracing::warn!(error = %e, "Failed to advance session over commit");
            }
        }
        Ok(())
    }

    fn has_uncondensed_content(&self, state: &SessionState) -> bool {
        transcript::read(&state.transcript_path)
            .map(|text| state.condensed_transcript_lines < transcript::line_count(&text))
            .unwrap_or(false)
    }

    fn advance_session_over_commit(
        &self,
        mut state: SessionState,
        old_base: &str,
        current_head: &mut String,
        trailer_id: &Option<CheckpointId>,
    ) -> Result<()> {
        let Some(step) = transition(Some(state.phase), Event::GitCommit) else {
            return Ok(());
        };
        let shadow = self.shadow();
        let mut outcome = ActionOutcome::default();

        for action in &step.actions {
            match action {
                Action::SetPendingCheckpointId => {
                    state.pending_checkpoint_id = Some(trailer_id.clone().unwrap_or_else(|| {
                        CheckpointId::derive(
                            &state.session_id,
                            old_base,
                            state.condensed_transcript_lines,
                        )
                    }));
                }
                Action::MigrateShadow => {
                    if let Err(e) = shadow.migrate(old_base, current_head) {
                        tracing::warn!(error = %e, "Shadow branch migration failed");
                    }
                }
                Action::UpdateBaseCommit => {
                    if !outcome.condense_failed {
                        state.base_commit = current_head.clone();
                    }
                }
                Action::CondenseIfNewContent => {
                    self.run_commit_condensation(
                        &mut state,
                        current_head,
                        trailer_id,
                        &mut outcome,
                    );
                }
                Action::CondenseIfFilesTouchedAndNewContent => {
                    if state.files_touched.is_empty() {
                        outcome.discard_session = true;
                    } else {
                        self.run_commit_condensation(
                            &mut state,
                            current_head,
                            trailer_id,
                            &mut outcome,
                        );
                        if !outcome.condense_failed {
                            outcome.discard_session = true;
                        }
                    }
                    if !outcome.condense_failed {
                        self.cleanup_shadow(&state, old_base, current_head)?;
                    }
                }
                Action::ClearPending => {
                    if !outcome.condense_failed {
                        state.pending_checkpoint_id = None;
                    }
                }
                Action::MigrateOrDeleteShadow => {
                    if !outcome.condense_failed {
                        self.cleanup_shadow(&state, old_base, current_head)?;
                    }
                }
                Action::CondenseDeferred => {
                    tracing::debug!("Deferred condensation runs at turn end, not post-commit");
                }
            }
        }

        state.phase = step.next;
        if outcome.discard_session {
            // ENDED discard path: no metadata write, state removed, branch
            // already cleaned up above.
            self.sessions.clear(&state.session_id)?;
        } else {
            self.sessions.save(&state)?;
        }
        Ok(())
    }

    /// The session no longer needs its shadow branch: delete it unless
    /// another live session maps to the same name, in which case hand it
    /// forward by migrating instead.
    fn cleanup_shadow(&self, state: &SessionState, old_base: &str, new_head: &str) -> Result<()> {
        let shadow = self.shadow();
        let others: Vec<String> = self
            .sessions
            .find_by_base_commit(old_base, &state.worktree_id)?
            .into_iter()
            .filter(|s| s.session_id != state.session_id)
            .map(|s| s.session_id)
            .collect();
        let result = if others.is_empty() {
            shadow.delete(old_base).map(|_| ())
        } else {
            shadow.migrate(old_base, new_head).map(|_| ())
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Shadow branch cleanup failed");
        }
        Ok(())
    }

    /// Condense-on-commit with the stripped-trailer opt-out: a reserved
    /// pending id whose trailer the user removed from the commit message
    /// means "no checkpoint link": skip the metadata write entirely.
    fn run_commit_condensation(
        &self,
        state: &mut SessionState,
        effective_head: &mut String,
        trailer_id: &Option<CheckpointId>,
        outcome: &mut ActionOutcome,
    ) {
        if state.pending_checkpoint_id.is_some() && trailer_id.is_none() {
            tracing::info!(
                session_id = %state.session_id,
                "Checkpoint trailer was removed from the commit; skipping condensation"
            );
            state.pending_checkpoint_id = None;
            return;
        }
        match self.condense_if_new_content(state, &effective_head.clone(), true) {
            Ok(Some(result)) => *effective_head = result.head,
            Ok(None) => {}
            Err(e) => {
                outcome.condense_failed = true;
                tracing::warn!(error = %e, "Condensation failed; state preserved for retry");
            }
        }
    }

    // ── SessionEnd ───────────────────────────────────────────────────

    pub fn handle_session_end(&self, event: &SessionEndEvent) -> Result<()> {
        validate_session_id(&event.session_id)?;
        if !self.config.enabled {
            return Ok(());
        }
        if self.repo.rebase_or_merge_in_progress() {
            tracing::debug!("Rebase or merge in progress; ignoring session-end");
            return Ok(());
        }
        let Some(mut state) = self.sessions.load(&event.session_id)? else {
            return Ok(());
        };
        let Some(step) = transition(Some(state.phase), Event::SessionEnd) else {
            return Ok(());
        };
        state.phase = step.next;
        state.ended_at = Some(Utc::now());
        state.last_interaction_at = Utc::now();
        self.sessions.save(&state)?;
        Ok(())
    }

    // ── SubAgentCheckpoint ───────────────────────────────────────────

    /// Mid-turn checkpoint from a sub-agent. Not a turn end: the phase does
    /// not move, only the chain grows.
    pub fn handle_subagent_checkpoint(&self, event: &SubAgentCheckpointEvent) -> Result<()> {
        validate_session_id(&event.session_id)?;
        if !self.config.enabled {
            return Ok(());
        }
        let Some(mut state) = self.sessions.load(&event.session_id)? else {
            tracing::warn!(session_id = %event.session_id, "Sub-agent checkpoint for unknown session");
            return Ok(());
        };
        if !matches!(state.phase, Phase::Active | Phase::ActiveCommitted) {
            tracing::warn!(
                session_id = %event.session_id,
                phase = %state.phase,
                "Sub-agent checkpoint outside a turn ignored"
            );
            return Ok(());
        }

        let author = event
            .author
            .as_ref()
            .map(|a| a.to_author())
            .unwrap_or_else(|| self.author());
        let mut included = event.modified_files.clone();
        included.sort_unstable();
        included.dedup();

        let step = state.step_count + 1;
        self.shadow().write_temporary(&TemporaryWrite {
            session_id: &state.session_id,
            base_commit: &state.base_commit,
            included_paths: &included,
            snapshot_all: state.step_count == 0,
            metadata_files: &[],
            subject: &format!(
                "Sub-agent checkpoint {} (seq {})",
                event.tool_use_id, event.increment_sequence
            ),
            author: &author,
            tool_use_id: Some(&event.tool_use_id),
            sequence: Some(event.increment_sequence),
        })?;

        state.step_count = step;
        state.record_files_touched(included);
        state.last_interaction_at = Utc::now();
        self.sessions.save(&state)?;
        Ok(())
    }

    // ── PrepareCommitMsg support ─────────────────────────────────────

    /// Reserve the checkpoint id a prepare-commit-msg hook should inject.
    /// Returns `None` when no session has anything to condense.
    pub fn reserve_checkpoint_id(&self) -> Result<Option<CheckpointId>> {
        let head = self.repo.head()?;
        for mut state in self
            .sessions
            .find_by_base_commit(&head, &self.repo.worktree_id())?
        {
            if state.phase == Phase::Ended && state.files_touched.is_empty() {
                continue;
            }
            let Ok(text) = transcript::read(&state.transcript_path) else {
                continue;
            };
            if state.condensed_transcript_lines >= transcript::line_count(&text) {
                continue;
            }
            let id = state.pending_checkpoint_id.clone().unwrap_or_else(|| {
                CheckpointId::derive(
                    &state.session_id,
                    &state.base_commit,
                    state.condensed_transcript_lines,
                )
            });
            state.pending_checkpoint_id = Some(id.clone());
            self.sessions.save(&state)?;
            return Ok(Some(id));
        }
        Ok(None)
    }

    // ── Rewind ───────────────────────────────────────────────────────

    /// Rewind `steps_back` temporary checkpoints (1 = most recent). Preview
    /// returns the plan without mutating anything.
    pub fn rewind(&self, session_id: &str, steps_back: usize, preview: bool) -> Result<RewindPlan> {
        validate_session_id(session_id)?;
        let Some(state) = self.sessions.load(session_id)? else {
            bail!("No session '{session_id}'");
        };
        if steps_back == 0 {
            bail!("steps_back must be at least 1");
        }

        let checkpoints =
            self.shadow()
                .list_temporary(&state.base_commit, session_id, 200)?;
        let target = checkpoints
            .get(steps_back - 1)
            .with_context(|| {
                format!(
                    "Session '{session_id}' has {} checkpoint(s), cannot rewind {steps_back}",
                    checkpoints.len()
                )
            })?
            .sha
            .clone();

        let reserved = self.registry.reserved_dirs();
        if preview {
            rewind::plan(&self.repo, &state, &target, &reserved)
        } else {
            rewind::execute(&self.repo, &state, &target, &reserved)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entire_core::StrategyKind;
    use entire_store::committed::METADATA_REF;
    use entire_store::{CommittedStore, shadow_ref};
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
        assert!(
            output.status.success(),
            "git {:?}: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// A scratch repository plus an out-of-repo directory for transcripts.
    struct Fixture {
        repo_dir: TempDir,
        aux: TempDir,
        registry: Registry,
    }

    impl Fixture {
        fn new() -> Fixture {
            let repo_dir = tempfile::tempdir().unwrap();
            git(repo_dir.path(), &["init", "-q", "-b", "main"]);
            git(repo_dir.path(), &["config", "user.email", "test@localhost"]);
            git(repo_dir.path(), &["config", "user.name", "Test"]);
            std::fs::write(repo_dir.path().join("README.md"), "hello\n").unwrap();
            git(repo_dir.path(), &["add", "."]);
            git(repo_dir.path(), &["commit", "-q", "-m", "initial"]);
            Fixture {
                repo_dir,
                aux: tempfile::tempdir().unwrap(),
                registry: Registry::builtin(),
            }
        }

        fn path(&self) -> &Path {
            self.repo_dir.path()
        }

        fn orch(&self) -> Orchestrator<'_> {
            self.orch_with(Config::default())
        }

        fn orch_with(&self, config: Config) -> Orchestrator<'_> {
            let repo = Repo::discover(self.path()).unwrap();
            Orchestrator::new(repo, config, &self.registry)
        }

        fn head(&self) -> String {
            git(self.path(), &["rev-parse", "HEAD"]).trim().to_string()
        }

        fn commit_all(&self, message: &str) -> String {
            git(self.path(), &["add", "-A"]);
            git(self.path(), &["commit", "-q", "-m", message]);
            self.head()
        }

        fn transcript(&self, name: &str, lines: usize) -> PathBuf {
            let path = self.aux.path().join(name);
            self.write_transcript(&path, lines);
            path
        }

        fn write_transcript(&self, path: &Path, lines: usize) {
            let mut text = String::new();
            for index in 0..lines {
                text.push_str(&format!("{{\"line\":{index}}}\n"));
            }
            std::fs::write(path, text).unwrap();
        }

        fn prompt(&self, orch: &Orchestrator<'_>, session: &str, transcript: &Path) {
            orch.handle_prompt_submit(&PromptSubmitEvent {
                session_id: session.to_string(),
                agent: "claude-code".into(),
                worktree_path: self.path().to_path_buf(),
                transcript_path: transcript.to_path_buf(),
                prompt: Some("do the thing".into()),
            })
            .unwrap();
        }

        fn turn_end(
            &self,
            orch: &Orchestrator<'_>,
            session: &str,
            transcript: &Path,
            modified: &[&str],
        ) {
            orch.handle_turn_end(&TurnEndEvent {
                session_id: session.to_string(),
                transcript_path: transcript.to_path_buf(),
                modified_files: modified.iter().map(|s| s.to_string()).collect(),
                new_files: Vec::new(),
                deleted_files: Vec::new(),
                transcript_text: None,
                prompts: vec!["do the thing".into()],
                summary: Some("did the thing".into()),
                context: None,
                token_usage: None,
                author: None,
            })
            .unwrap();
        }
    }

    // ── Single session, single commit ────────────────────────────────

    #[test]
    fn test_happy_path_condenses_and_links_commit() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 4);
        let base = fx.head();

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "agent line\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        let shadow_name = shadow_ref(&base, "");
        assert!(orch.repo().read_ref(&shadow_name).unwrap().is_some());

        fx.commit_all("user: add a");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        // The amended HEAD carries the trailer and the shard exists.
        let head = fx.head();
        let message = orch.repo().commit_message(&head).unwrap();
        let id = checkpoint_id(&message).expect("trailer injected");
        let committed = CommittedStore::new(orch.repo()).read_committed(&id).unwrap();
        assert_eq!(committed.metadata.session_id, "s-1");
        assert_eq!(committed.metadata.session_count, 1);
        assert!(committed.prompts.contains("do the thing"));
        assert!(committed.transcript.contains("\"line\":0"));
        assert_eq!(committed.metadata.files_touched, vec!["a.txt".to_string()]);

        let attribution = committed.metadata.initial_attribution.unwrap();
        assert_eq!(attribution.user_added, 0);
        assert_eq!(attribution.agent_added, 1);
        assert_eq!(attribution.total_committed, 1);

        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.step_count, 0);
        assert_eq!(state.base_commit, head);
        assert_eq!(state.attribution_base_commit, head);
        assert_eq!(state.condensed_transcript_lines, 4);
        assert_eq!(state.last_checkpoint_id, Some(id));

        // No other session needed the shadow branch.
        assert!(orch.repo().read_ref(&shadow_name).unwrap().is_none());
    }

    // ── Mid-turn commit defers condensation ──────────────────────────

    #[test]
    fn test_mid_turn_commit_defers_and_preserves_attribution() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);
        let original_base = fx.head();

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "one\ntwo\n").unwrap();

        // User commits while the turn is still running.
        let mid_commit = fx.commit_all("user: commit mid-turn");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.phase, Phase::ActiveCommitted);
        assert_eq!(state.base_commit, mid_commit);
        assert_eq!(state.attribution_base_commit, original_base);
        let pending = state.pending_checkpoint_id.clone().expect("pending reserved");

        // The turn finishes afterwards.
        fx.write_transcript(&transcript, 5);
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        let committed = CommittedStore::new(orch.repo()).read_committed(&pending).unwrap();
        let attribution = committed.metadata.initial_attribution.unwrap();
        // Measured from the ORIGINAL base across the commit boundary.
        assert_eq!(attribution.total_committed, 2);
        assert_eq!(attribution.agent_added, 2);
        assert_eq!(attribution.user_added, 0);

        let head = fx.head();
        let message = orch.repo().commit_message(&head).unwrap();
        assert_eq!(checkpoint_id(&message), Some(pending.clone()));

        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.step_count, 0);
        assert!(state.pending_checkpoint_id.is_none());
        assert_eq!(state.base_commit, head);
        assert_eq!(state.attribution_base_commit, head);
    }

    // ── Two active sessions, one commit ──────────────────────────────

    #[test]
    fn test_two_active_sessions_share_migrated_branch() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let base = fx.head();
        let t1 = fx.transcript("s1.jsonl", 2);
        let t2 = fx.transcript("s2.jsonl", 2);

        fx.prompt(&orch, "s-1", &t1);
        // A sub-agent checkpoint gives the shared branch its first commit.
        orch.handle_subagent_checkpoint(&SubAgentCheckpointEvent {
            session_id: "s-1".into(),
            tool_use_id: "toolu_1".into(),
            increment_sequence: 1,
            modified_files: Vec::new(),
            transcript_slice: None,
            author: None,
        })
        .unwrap();
        fx.prompt(&orch, "s-2", &t2);

        let s2 = orch.sessions().load("s-2").unwrap().unwrap();
        assert!(s2.concurrent_warning_shown);

        std::fs::write(fx.path().join("u.txt"), "u\n").unwrap();
        let new_head = fx.commit_all("user: commit while both active");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        for session in ["s-1", "s-2"] {
            let state = orch.sessions().load(session).unwrap().unwrap();
            assert_eq!(state.phase, Phase::ActiveCommitted, "{session}");
            assert_eq!(state.base_commit, new_head, "{session}");
            assert_eq!(state.attribution_base_commit, base, "{session}");
            assert!(state.pending_checkpoint_id.is_some(), "{session}");
        }

        assert!(orch.repo().read_ref(&shadow_ref(&base, "")).unwrap().is_none());
        assert!(orch.repo().read_ref(&shadow_ref(&new_head, "")).unwrap().is_some());
    }

    // ── Two IDLE sessions condense into one checkpoint ───────────────

    #[test]
    fn test_idle_concurrent_sessions_condense_under_one_id() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let t1 = fx.transcript("s1.jsonl", 3);
        let t2 = fx.transcript("s2.jsonl", 2);

        fx.prompt(&orch, "s-1", &t1);
        std::fs::write(fx.path().join("f1.txt"), "f1\n").unwrap();
        fx.turn_end(&orch, "s-1", &t1, &["f1.txt"]);

        fx.prompt(&orch, "s-2", &t2);
        std::fs::write(fx.path().join("f2.txt"), "f2\n").unwrap();
        fx.turn_end(&orch, "s-2", &t2, &["f2.txt"]);

        fx.commit_all("user: both sessions' work");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        let head = fx.head();
        let id = checkpoint_id(&orch.repo().commit_message(&head).unwrap()).unwrap();
        let committed = CommittedStore::new(orch.repo()).read_committed(&id).unwrap();
        assert_eq!(committed.metadata.session_id, "s-1");
        assert_eq!(
            committed.metadata.session_ids,
            vec!["s-1".to_string(), "s-2".to_string()]
        );
        assert_eq!(committed.archived_sessions.len(), 1);
        assert_eq!(committed.archived_sessions[0].session_id, "s-2");

        // Both sessions stay live, cursors advanced, based at the new head.
        for session in ["s-1", "s-2"] {
            let state = orch.sessions().load(session).unwrap().unwrap();
            assert_eq!(state.base_commit, head, "{session}");
            assert_eq!(state.last_checkpoint_id, Some(id.clone()), "{session}");
            assert_eq!(state.step_count, 0, "{session}");
        }
        let s1 = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(s1.condensed_transcript_lines, 3);
        let s2 = orch.sessions().load("s-2").unwrap().unwrap();
        assert_eq!(s2.condensed_transcript_lines, 2);
    }

    // ── Condensation failure preserves state ─────────────────────────

    #[test]
    fn test_condensation_failure_preserves_state() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);
        let base = fx.head();

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "a\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        // Corrupt the shadow ref: point it at a missing object.
        let branch = entire_store::shadow_branch(&base, "");
        let ref_path = orch.repo().common_dir().join("refs/heads").join(&branch);
        std::fs::write(&ref_path, format!("{}\n", "0".repeat(40))).unwrap();

        fx.commit_all("user: commit over corruption");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.base_commit, base, "base must not advance");
        assert_eq!(state.step_count, 1);
        assert_eq!(state.condensed_transcript_lines, 0);
        assert!(orch.repo().read_ref(METADATA_REF).unwrap().is_none());
        // The corrupt branch is preserved for doctor recovery.
        assert!(orch.repo().read_ref(&shadow_ref(&base, "")).unwrap().is_some());
    }

    // ── User strips the injected trailer ─────────────────────────────

    #[test]
    fn test_stripped_trailer_skips_condensation() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);
        let base = fx.head();

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "a\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        // prepare-commit-msg reserved an id, but the user removes the
        // trailer before committing.
        let reserved = orch.reserve_checkpoint_id().unwrap().expect("reservable");
        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.pending_checkpoint_id, Some(reserved));

        let new_head = fx.commit_all("user: no trailer here");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.base_commit, new_head, "base still advances");
        assert!(state.pending_checkpoint_id.is_none());
        assert!(orch.repo().read_ref(METADATA_REF).unwrap().is_none());
        assert!(orch.repo().read_ref(&shadow_ref(&base, "")).unwrap().is_none());
        // The commit message was left alone.
        assert!(checkpoint_id(&orch.repo().commit_message(&new_head).unwrap()).is_none());
    }

    // ── Idle commit with no new content is a metadata no-op ──────────

    #[test]
    fn test_idle_commit_without_new_content_only_advances_base() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "a\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);
        fx.commit_all("user: first");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        let metadata_before = orch.repo().read_ref(METADATA_REF).unwrap();
        assert!(metadata_before.is_some());

        // A second commit with no session activity since.
        std::fs::write(fx.path().join("b.txt"), "b\n").unwrap();
        let second = fx.commit_all("user: unrelated");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.base_commit, second);
        assert_eq!(orch.repo().read_ref(METADATA_REF).unwrap(), metadata_before);
        // No amend happened either.
        assert_eq!(fx.head(), second);
    }

    // ── Rebase suppression ───────────────────────────────────────────

    #[test]
    fn test_rebase_in_progress_suppresses_post_commit() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);
        let base = fx.head();

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "a\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        fx.commit_all("user: commit");
        // An operational state appears before the hook fires.
        std::fs::write(orch.repo().git_dir().join("MERGE_HEAD"), "0".repeat(40)).unwrap();
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        // Nothing moved.
        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.base_commit, base);
        assert_eq!(state.phase, Phase::Idle);
        assert!(orch.repo().read_ref(METADATA_REF).unwrap().is_none());

        // The next hook after the state clears proceeds normally.
        std::fs::remove_file(orch.repo().git_dir().join("MERGE_HEAD")).unwrap();
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();
        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.base_commit, fx.head());
    }

    // ── Rewind preserves session-start untracked files ───────────────

    #[test]
    fn test_rewind_preserves_untracked_files_at_start() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);

        std::fs::write(fx.path().join(".config.local"), "secret\n").unwrap();
        fx.prompt(&orch, "s-1", &transcript);
        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert!(
            state
                .untracked_files_at_start
                .contains(&".config.local".to_string())
        );

        std::fs::write(fx.path().join("a.txt"), "a\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("b.txt"), "b\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["b.txt"]);

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("c.txt"), "c\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["c.txt"]);

        // Preview first: nothing mutates.
        let plan = orch.rewind("s-1", 3, true).unwrap();
        assert!(plan.delete.contains(&"b.txt".to_string()));
        assert!(plan.delete.contains(&"c.txt".to_string()));
        assert!(!plan.delete.contains(&".config.local".to_string()));
        assert!(fx.path().join("b.txt").exists());

        let plan = orch.rewind("s-1", 3, false).unwrap();
        assert!(plan.restore.contains(&"a.txt".to_string()));

        assert_eq!(
            std::fs::read_to_string(fx.path().join(".config.local")).unwrap(),
            "secret\n"
        );
        assert!(fx.path().join("a.txt").exists());
        assert!(!fx.path().join("b.txt").exists());
        assert!(!fx.path().join("c.txt").exists());
        // Tracked files are unaffected.
        assert_eq!(
            std::fs::read_to_string(fx.path().join("README.md")).unwrap(),
            "hello\n"
        );

        // Forward checkpoints were discarded from the shadow branch.
        let state = orch.sessions().load("s-1").unwrap().unwrap();
        let shadow = ShadowStore::new(orch.repo());
        let remaining = shadow
            .list_temporary(&state.base_commit, "s-1", 50)
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }

    // ── ENDED session flush and discard paths ────────────────────────

    #[test]
    fn test_ended_session_with_work_condenses_on_next_commit() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 3);

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "a\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);
        orch.handle_session_end(&SessionEndEvent {
            session_id: "s-1".into(),
        })
        .unwrap();

        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.phase, Phase::Ended);
        assert!(state.ended_at.is_some());

        fx.commit_all("user: commit the ended session's work");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        // Condensed, then the session record was removed.
        let head = fx.head();
        let id = checkpoint_id(&orch.repo().commit_message(&head).unwrap()).unwrap();
        assert!(CommittedStore::new(orch.repo()).read_committed(&id).is_ok());
        assert!(orch.sessions().load("s-1").unwrap().is_none());
    }

    #[test]
    fn test_ended_session_without_files_is_discarded() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);

        fx.prompt(&orch, "s-1", &transcript);
        orch.handle_session_end(&SessionEndEvent {
            session_id: "s-1".into(),
        })
        .unwrap();

        std::fs::write(fx.path().join("u.txt"), "u\n").unwrap();
        fx.commit_all("user: unrelated");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        assert!(orch.sessions().load("s-1").unwrap().is_none());
        assert!(orch.repo().read_ref(METADATA_REF).unwrap().is_none());
    }

    // ── Auto-commit strategy ─────────────────────────────────────────

    #[test]
    fn test_auto_commit_condenses_every_turn() {
        let fx = Fixture::new();
        let config = Config {
            strategy: StrategyKind::AutoCommit,
            ..Config::default()
        };
        let orch = fx.orch_with(config);
        let transcript = fx.transcript("s1.jsonl", 3);

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "a\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.condensed_transcript_lines, 3);
        assert_eq!(state.step_count, 0);
        let id = state.last_checkpoint_id.expect("condensed");

        let committed = CommittedStore::new(orch.repo()).read_committed(&id).unwrap();
        assert_eq!(committed.metadata.strategy, "auto-commit");
        // No user commit was amended.
        assert!(checkpoint_id(&orch.repo().commit_message(&fx.head()).unwrap()).is_none());
    }

    // ── Misc orchestration behavior ──────────────────────────────────

    #[test]
    fn test_user_edits_between_turns_are_attributed_to_user() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "agent\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        // The user edits README while the agent is idle.
        std::fs::write(fx.path().join("README.md"), "hello\nuser line\n").unwrap();
        fx.write_transcript(&transcript, 4);
        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("b.txt"), "agent again\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["b.txt"]);

        fx.commit_all("user: everything");
        orch.handle_post_commit(&GitCommitEvent::default()).unwrap();

        let head = fx.head();
        let id = checkpoint_id(&orch.repo().commit_message(&head).unwrap()).unwrap();
        let committed = CommittedStore::new(orch.repo()).read_committed(&id).unwrap();
        let attribution = committed.metadata.initial_attribution.unwrap();
        assert_eq!(attribution.user_added, 1);
        assert_eq!(attribution.total_committed, 3);
        assert_eq!(attribution.agent_added, 2);
        assert_eq!(attribution.user_added_per_file.get("README.md"), Some(&1));
    }

    #[test]
    fn test_reserve_checkpoint_id_is_stable() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);

        fx.prompt(&orch, "s-1", &transcript);
        std::fs::write(fx.path().join("a.txt"), "a\n").unwrap();
        fx.turn_end(&orch, "s-1", &transcript, &["a.txt"]);

        let first = orch.reserve_checkpoint_id().unwrap().unwrap();
        let second = orch.reserve_checkpoint_id().unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_disabled_config_is_a_noop() {
        let fx = Fixture::new();
        let config = Config {
            enabled: false,
            ..Config::default()
        };
        let orch = fx.orch_with(config);
        let transcript = fx.transcript("s1.jsonl", 2);

        fx.prompt(&orch, "s-1", &transcript);
        assert!(orch.sessions().load("s-1").unwrap().is_none());
    }

    #[test]
    fn test_prompt_on_ended_session_does_not_revive() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);

        fx.prompt(&orch, "s-1", &transcript);
        orch.handle_session_end(&SessionEndEvent {
            session_id: "s-1".into(),
        })
        .unwrap();

        fx.prompt(&orch, "s-1", &transcript);
        let state = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(state.phase, Phase::Ended);
    }

    #[test]
    fn test_invalid_session_id_is_hard_failure() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);

        let err = orch
            .handle_prompt_submit(&PromptSubmitEvent {
                session_id: "../evil".into(),
                agent: "claude-code".into(),
                worktree_path: fx.path().to_path_buf(),
                transcript_path: transcript,
                prompt: None,
            })
            .unwrap_err();
        let kind = err.downcast_ref::<EntireError>().unwrap();
        assert!(kind.is_hard_failure());
    }

    #[test]
    fn test_turn_end_with_missing_transcript_skips_silently() {
        let fx = Fixture::new();
        let orch = fx.orch();
        let transcript = fx.transcript("s1.jsonl", 2);

        fx.prompt(&orch, "s-1", &transcript);
        let before = orch.sessions().load("s-1").unwrap().unwrap();

        orch.handle_turn_end(&TurnEndEvent {
            session_id: "s-1".into(),
            transcript_path: fx.aux.path().join("gone.jsonl"),
            modified_files: vec!["a.txt".into()],
            new_files: Vec::new(),
            deleted_files: Vec::new(),
            transcript_text: None,
            prompts: Vec::new(),
            summary: None,
            context: None,
            token_usage: None,
            author: None,
        })
        .unwrap();

        // No checkpoint, no state mutation.
        let after = orch.sessions().load("s-1").unwrap().unwrap();
        assert_eq!(after.step_count, before.step_count);
        assert_eq!(after.phase, before.phase);
    }
}
