//! Temporary checkpoints: the per-`(base commit, worktree)` shadow branch.

use crate::{MAX_REF_RETRIES, ZERO_OID};
use anyhow::{Context, Result};
use entire_core::trailer::{
    TRAILER_SEQUENCE, TRAILER_SESSION, TRAILER_TEMPORARY, TRAILER_TOOL_USE,
};
use entire_core::{EntireError, validate_session_id};
use entire_git::trailers::parse_trailers;
use entire_git::{Author, Repo};

/// Length of the commit prefix used in shadow branch names.
const SHORT_SHA_LEN: usize = 7;

/// Branch name for a `(base commit, worktree id)` pair. Main-worktree
/// sessions omit the worktree segment.
pub fn shadow_branch(base_commit: &str, worktree_id: &str) -> String {
    let short = &base_commit[..SHORT_SHA_LEN.min(base_commit.len())];
    if worktree_id.is_empty() {
        format!("entire/{short}")
    } else {
        format!("entire/{short}/{worktree_id}")
    }
}

/// Fully-qualified ref name for [`shadow_branch`].
pub fn shadow_ref(base_commit: &str, worktree_id: &str) -> String {
    format!("refs/heads/{}", shadow_branch(base_commit, worktree_id))
}

/// One temporary checkpoint read back from a shadow branch.
#[derive(Debug, Clone)]
pub struct TemporaryCheckpoint {
    pub sha: String,
    pub session_id: String,
    pub subject: String,
    pub tool_use_id: Option<String>,
    pub sequence: Option<u32>,
}

/// A checkpoint about to be written.
#[derive(Debug, Clone)]
pub struct TemporaryWrite<'a> {
    pub session_id: &'a str,
    pub base_commit: &'a str,
    /// Modified ∪ new ∪ deleted paths; ignored when `snapshot_all` is set.
    pub included_paths: &'a [String],
    /// First checkpoint of a session snapshots the working copy as-is.
    pub snapshot_all: bool,
    /// `(repo-relative path, content)` blobs under the session's metadata
    /// directory.
    pub metadata_files: &'a [(String, Vec<u8>)],
    pub subject: &'a str,
    pub author: &'a Author,
    pub tool_use_id: Option<&'a str>,
    pub sequence: Option<u32>,
}

/// Shadow-branch operations bound to one repository worktree.
pub struct ShadowStore<'a> {
    repo: &'a Repo,
}

impl<'a> ShadowStore<'a> {
    pub fn new(repo: &'a Repo) -> Self {
        ShadowStore { repo }
    }

    fn ref_name(&self, base_commit: &str) -> String {
        shadow_ref(base_commit, &self.repo.worktree_id())
    }

    /// Current tip of the shadow branch for `base_commit`, verified to
    /// point at a real commit.
    pub fn tip(&self, base_commit: &str) -> Result<Option<String>> {
        let name = self.ref_name(base_commit);
        let Some(tip) = self.repo.read_ref(&name)? else {
            return Ok(None);
        };
        if !self.repo.commit_exists(&tip)? {
            return Err(EntireError::ShadowBranchCorrupt {
                branch: name,
                reason: format!("ref points at missing object {tip}"),
            }
            .into());
        }
        Ok(Some(tip))
    }

    /// Session id recorded on the branch tip, for startup conflict checks.
    pub fn tip_session(&self, base_commit: &str) -> Result<Option<String>> {
        let Some(tip) = self.tip(base_commit)? else {
            return Ok(None);
        };
        let message = self.repo.commit_message(&tip)?;
        Ok(parse_trailers(&message).get(TRAILER_SESSION).cloned())
    }

    /// Append a temporary checkpoint to the shadow branch, creating the
    /// branch off `base_commit` if this is its first checkpoint.
    ///
    /// Every shadow commit carries `Entire-Session`; concurrent sessions on
    /// the same base share the branch. The ref advance is compare-and-swap
    /// against the tip read at the start of the attempt, so a concurrent
    /// writer never has its checkpoint clobbered off the chain: on a lost
    /// race the whole write is rebuilt on the new tip and retried.
    pub fn write_temporary(&self, write: &TemporaryWrite<'_>) -> Result<String> {
        validate_session_id(write.session_id)?;

        let prefix = format!(".entire/metadata/{}/", write.session_id);
        let blobs: Vec<(String, Vec<u8>)> = write
            .metadata_files
            .iter()
            .map(|(path, content)| (format!("{prefix}{path}"), content.clone()))
            .collect();

        let mut message = format!(
            "{}\n\n{TRAILER_SESSION}: {}\n{TRAILER_TEMPORARY}: 1\n",
            write.subject, write.session_id
        );
        if let Some(tool_use) = write.tool_use_id {
            message.push_str(&format!("{TRAILER_TOOL_USE}: {tool_use}\n"));
        }
        if let Some(sequence) = write.sequence {
            message.push_str(&format!("{TRAILER_SEQUENCE}: {sequence}\n"));
        }

        let name = self.ref_name(write.base_commit);
        let mut attempt = 0;
        loop {
            let tip = self.tip(write.base_commit)?;
            let parent = tip.clone().unwrap_or_else(|| write.base_commit.to_string());
            let base_tree = self.repo.commit_tree(&parent)?;

            let tree = self.repo.compose_tree(
                &base_tree,
                write.included_paths,
                &[],
                write.snapshot_all,
                &blobs,
            )?;
            let sha = self
                .repo
                .create_commit(&tree, &[parent.as_str()], write.author, &message)?;

            // An all-zero old value tells update-ref the ref must not exist
            // yet, so branch creation races serialize the same way.
            let expected = tip.as_deref().unwrap_or(ZERO_OID);
            match self.repo.set_ref(&name, &sha, Some(expected)) {
                Ok(()) => return Ok(sha),
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_REF_RETRIES {
                        return Err(e).context("Failed to advance shadow branch");
                    }
                    tracing::debug!(
                        branch = %name,
                        error = %e,
                        "Shadow tip moved during write; retrying on the new tip"
                    );
                }
            }
        }
    }

    /// Temporary checkpoints for `session_id`, newest first. The walk stops
    /// at the first commit without the temporary marker (the base commit)
    /// or after `limit` checkpoints.
    pub fn list_temporary(
        &self,
        base_commit: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<TemporaryCheckpoint>> {
        let Some(tip) = self.tip(base_commit)? else {
            return Ok(Vec::new());
        };

        let mut checkpoints = Vec::new();
        for commit in self.repo.walk_commits(&tip, None, 200)? {
            let trailers = parse_trailers(&commit.message);
            if !trailers.contains_key(TRAILER_TEMPORARY) {
                break;
            }
            if trailers.get(TRAILER_SESSION).map(String::as_str) != Some(session_id) {
                continue;
            }
            checkpoints.push(TemporaryCheckpoint {
                sha: commit.sha.clone(),
                session_id: session_id.to_string(),
                subject: commit.message.lines().next().unwrap_or_default().to_string(),
                tool_use_id: trailers.get(TRAILER_TOOL_USE).cloned(),
                sequence: trailers.get(TRAILER_SEQUENCE).and_then(|s| s.parse().ok()),
            });
            if checkpoints.len() >= limit {
                break;
            }
        }
        Ok(checkpoints)
    }

    /// Rename the shadow branch when the base commit moves. The temporary
    /// chain stays intact; only the ref name changes. First writer wins: if
    /// the target already exists the existing ref is left alone and this is
    /// a no-op.
    pub fn migrate(&self, old_base: &str, new_base: &str) -> Result<bool> {
        let worktree = self.repo.worktree_id();
        let old_ref = shadow_ref(old_base, &worktree);
        let new_ref = shadow_ref(new_base, &worktree);
        if old_ref == new_ref {
            return Ok(false);
        }

        let Some(tip) = self.repo.read_ref(&old_ref)? else {
            return Ok(false);
        };
        if self.repo.read_ref(&new_ref)?.is_some() {
            // Another session got there first; both now share the target.
            tracing::debug!(target_ref = %new_ref, "Shadow migration target exists; sharing");
            return Ok(false);
        }

        self.repo.set_ref(&new_ref, &tip, None)?;
        self.repo.delete_ref(&old_ref)?;
        tracing::debug!(from = %old_ref, to = %new_ref, "Migrated shadow branch");
        Ok(true)
    }

    /// Delete the shadow branch for `base_commit` if it exists.
    pub fn delete(&self, base_commit: &str) -> Result<bool> {
        let name = self.ref_name(base_commit);
        if self.repo.read_ref(&name)?.is_none() {
            return Ok(false);
        }
        self.repo.delete_ref(&name)?;
        tracing::debug!(branch = %name, "Deleted shadow branch");
        Ok(true)
    }

    /// Reset the shadow branch to `target`, discarding newer checkpoints
    /// (used by rewind; the discarded commits become unreachable).
    pub fn reset_to(&self, base_commit: &str, target: &str) -> Result<()> {
        let name = self.ref_name(base_commit);
        let message = self.repo.commit_message(target)?;
        if !parse_trailers(&message).contains_key(TRAILER_SESSION) {
            return Err(EntireError::ShadowBranchCorrupt {
                branch: name,
                reason: format!("target {target} has no session trailer"),
            }
            .into());
        }
        self.repo.set_ref(&name, target, None)
    }
}
