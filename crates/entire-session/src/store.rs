//! Session state persistence.
//!
//! One JSON file per session under `<git-common-dir>/entire-sessions/`,
//! shared by all worktrees. Saves are atomic (write to temp, rename), reads
//! of missing files are "no such session", and listing skips corrupt files
//! with a warning instead of failing the hook.

use crate::state::SessionState;
use anyhow::{Context, Result};
use entire_core::validate_session_id;
use std::io::Write;
use std::path::{Path, PathBuf};

const DIR_NAME: &str = "entire-sessions";

/// Store rooted at a repository's common git directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(git_common_dir: &Path) -> Self {
        SessionStore {
            dir: git_common_dir.join(DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    /// Load a session. A missing file is `Ok(None)`; a corrupt file is an
    /// error for the caller to handle.
    pub fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.path_for(session_id)?;
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read session file {}", path.display()));
            }
        };
        let state: SessionState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session file {}", path.display()))?;
        Ok(Some(state))
    }

    /// Atomically persist a session: write to a temp file in the same
    /// directory, then rename over the destination.
    pub fn save(&self, state: &SessionState) -> Result<()> {
        let path = self.path_for(&state.session_id)?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create sessions dir {}", self.dir.display()))?;

        let json = serde_json::to_string_pretty(state).context("Failed to serialize session")?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temp session file")?;
        temp.write_all(json.as_bytes())
            .context("Failed to write session state")?;
        temp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to rename session file into {}", path.display()))?;
        Ok(())
    }

    /// Remove a session's state file. Missing is fine.
    pub fn clear(&self, session_id: &str) -> Result<()> {
        let path = self.path_for(session_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove session file {}", path.display()))
            }
        }
    }

    /// Every loadable session. Corrupt or foreign files are skipped with a
    /// warning.
    pub fn list(&self) -> Result<Vec<SessionState>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.dir.display()));
            }
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read sessions dir entry")?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(session_id) = name.strip_suffix(".json") else {
                continue;
            };
            if validate_session_id(session_id).is_err() {
                continue;
            }
            match self.load(session_id) {
                Ok(Some(state)) => sessions.push(state),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        session_id,
                        error = %e,
                        "Skipping corrupt session state file"
                    );
                }
            }
        }
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(sessions)
    }

    /// Live sessions whose `(base_commit, worktree_id)` matches.
    pub fn find_by_base_commit(
        &self,
        base_commit: &str,
        worktree_id: &str,
    ) -> Result<Vec<SessionState>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.base_commit == base_commit && s.worktree_id == worktree_id)
            .collect())
    }

    /// Sessions bound to a worktree.
    pub fn find_by_worktree(&self, worktree_id: &str) -> Result<Vec<SessionState>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.worktree_id == worktree_id)
            .collect())
    }
}
