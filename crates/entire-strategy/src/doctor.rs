//! Consistency checks and explicit recovery.
//!
//! Doctor is the escape hatch for the lock-free coordination model: it
//! reports inconsistencies and performs explicit discards, never automatic
//! repair.

use anyhow::Result;
use entire_git::Repo;
use entire_session::{Phase, SessionStore};
use entire_store::{ShadowStore, committed::METADATA_REF, shadow_ref};

/// One session as seen by doctor.
#[derive(Debug, Clone)]
pub struct SessionHealth {
    pub session_id: String,
    pub phase: Phase,
    pub base_commit: String,
    /// Whether the base commit still resolves in this repository.
    pub base_resolvable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub sessions: Vec<SessionHealth>,
    /// Shadow branches no live session maps to.
    pub orphaned_shadow_branches: Vec<String>,
    /// State files that failed to parse.
    pub corrupt_state_files: Vec<String>,
    pub metadata_branch_exists: bool,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.orphaned_shadow_branches.is_empty()
            && self.corrupt_state_files.is_empty()
            && self.sessions.iter().all(|s| s.base_resolvable)
    }
}

/// Inspect sessions, shadow branches, and the metadata branch.
pub fn run_doctor(repo: &Repo, sessions: &SessionStore) -> Result<DoctorReport> {
    let mut report = DoctorReport {
        metadata_branch_exists: repo.read_ref(METADATA_REF)?.is_some(),
        ..Default::default()
    };

    let live = sessions.list()?;
    for state in &live {
        report.sessions.push(SessionHealth {
            session_id: state.session_id.clone(),
            phase: state.phase,
            base_commit: state.base_commit.clone(),
            base_resolvable: repo.commit_exists(&state.base_commit)?,
        });
    }

    let expected: Vec<String> = live
        .iter()
        .map(|s| shadow_ref(&s.base_commit, &s.worktree_id))
        .collect();
    for (name, _oid) in repo.list_refs("refs/heads/entire/")? {
        if name.starts_with("refs/heads/entire/checkpoints/") {
            continue;
        }
        if !expected.contains(&name) {
            report.orphaned_shadow_branches.push(name);
        }
    }

    report.corrupt_state_files = corrupt_state_files(sessions);
    Ok(report)
}

fn corrupt_state_files(sessions: &SessionStore) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(sessions.dir()) else {
        return Vec::new();
    };
    let mut corrupt = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(session_id) = name.strip_suffix(".json") else {
            continue;
        };
        if entire_core::validate_session_id(session_id).is_err() {
            continue;
        }
        if sessions.load(session_id).is_err() {
            corrupt.push(name);
        }
    }
    corrupt.sort_unstable();
    corrupt
}

/// Explicitly discard a session: remove its state file and delete its
/// shadow branch when no other session still maps to it.
pub fn discard_session(repo: &Repo, sessions: &SessionStore, session_id: &str) -> Result<()> {
    let state = match sessions.load(session_id) {
        Ok(Some(state)) => state,
        Ok(None) => return Ok(()),
        Err(e) => {
            // A corrupt file is exactly what discard exists for.
            tracing::warn!(error = %e, "Discarding unreadable session state");
            sessions.clear(session_id)?;
            return Ok(());
        }
    };

    sessions.clear(session_id)?;
    let others = sessions.find_by_base_commit(&state.base_commit, &state.worktree_id)?;
    if others.is_empty() {
        ShadowStore::new(repo).delete(&state.base_commit)?;
    }
    tracing::info!(session_id, "Discarded session");
    Ok(())
}
