//! Permanent checkpoints on the metadata branch.

use crate::metadata::CheckpointMetadata;
use crate::{MAX_REF_RETRIES, ZERO_OID};
use anyhow::{Context, Result};
use entire_core::trailer::{
    TRAILER_AGENT, TRAILER_CHECKPOINT, TRAILER_SESSION, TRAILER_STRATEGY,
};
use entire_core::{CheckpointId, EntireError};
use entire_git::{Author, Repo};

/// The single well-known branch storing permanent checkpoints. Never
/// reachable from any user branch.
pub const METADATA_BRANCH: &str = "entire/checkpoints/v1";

/// Fully-qualified ref of [`METADATA_BRANCH`].
pub const METADATA_REF: &str = "refs/heads/entire/checkpoints/v1";

const FILE_METADATA: &str = "metadata.json";
const FILE_TRANSCRIPT: &str = "transcript.jsonl";
const FILE_PROMPT: &str = "prompt.txt";
const FILE_SUMMARY: &str = "summary.txt";
const FILE_CONTEXT: &str = "context.md";

/// Transcript and prompts of a prior session rolled into a condensation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivedSession {
    pub session_id: String,
    pub transcript: String,
    pub prompts: String,
}

/// Everything stored in one checkpoint shard.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedCheckpoint {
    pub metadata: CheckpointMetadata,
    pub transcript: String,
    pub prompts: String,
    pub summary_text: String,
    pub context: String,
    pub archived_sessions: Vec<ArchivedSession>,
}

/// Read/write access to the metadata branch of one repository.
pub struct CommittedStore<'a> {
    repo: &'a Repo,
}

impl<'a> CommittedStore<'a> {
    pub fn new(repo: &'a Repo) -> Self {
        CommittedStore { repo }
    }

    fn shard_dir(id: &CheckpointId) -> String {
        format!("{}/{}", id.shard(), id.rest())
    }

    /// Write (or idempotently overwrite) the shard for a checkpoint and
    /// advance the metadata branch. Creates the branch as a rootless commit
    /// when absent. The ref advance is compare-and-swap against the tip the
    /// shard was composed on; a lost race rebuilds on the new tip.
    pub fn write_committed(
        &self,
        checkpoint: &CommittedCheckpoint,
        author: &Author,
    ) -> Result<String> {
        let id = &checkpoint.metadata.checkpoint_id;
        let dir = Self::shard_dir(id);

        let metadata_json = serde_json::to_vec_pretty(&checkpoint.metadata)
            .context("Failed to serialize checkpoint metadata")?;
        let mut blobs: Vec<(String, Vec<u8>)> = vec![
            (format!("{dir}/{FILE_METADATA}"), metadata_json),
            (
                format!("{dir}/{FILE_TRANSCRIPT}"),
                checkpoint.transcript.clone().into_bytes(),
            ),
            (
                format!("{dir}/{FILE_PROMPT}"),
                checkpoint.prompts.clone().into_bytes(),
            ),
            (
                format!("{dir}/{FILE_SUMMARY}"),
                checkpoint.summary_text.clone().into_bytes(),
            ),
            (
                format!("{dir}/{FILE_CONTEXT}"),
                checkpoint.context.clone().into_bytes(),
            ),
        ];
        for (index, archived) in checkpoint.archived_sessions.iter().enumerate() {
            blobs.push((
                format!("{dir}/{index}/{FILE_TRANSCRIPT}"),
                archived.transcript.clone().into_bytes(),
            ));
            blobs.push((
                format!("{dir}/{index}/{FILE_PROMPT}"),
                archived.prompts.clone().into_bytes(),
            ));
        }

        let subject = if checkpoint.metadata.session_count > 1 {
            format!(
                "Checkpoint {id} ({} sessions)",
                checkpoint.metadata.session_count
            )
        } else {
            format!("Checkpoint {id}")
        };
        let message = format!(
            "{subject}\n\n{TRAILER_CHECKPOINT}: {id}\n{TRAILER_SESSION}: {}\n{TRAILER_STRATEGY}: {}\n{TRAILER_AGENT}: {}\n",
            checkpoint.metadata.session_id,
            checkpoint.metadata.strategy,
            checkpoint.metadata.agent,
        );

        let mut attempt = 0;
        loop {
            let parent = self.repo.read_ref(METADATA_REF)?;
            let base_tree = match &parent {
                Some(tip) => self.repo.commit_tree(tip)?,
                None => self.repo.empty_tree()?,
            };

            // Supersede any previous entry at the same shard wholesale, so a
            // re-condensation with fewer archived sessions leaves no stale
            // subdirectories behind.
            let excludes: Vec<String> = match &parent {
                Some(tip) => self
                    .repo
                    .ls_tree(tip)?
                    .into_iter()
                    .map(|e| e.path)
                    .filter(|p| p.starts_with(&format!("{dir}/")))
                    .collect(),
                None => Vec::new(),
            };

            let tree = self
                .repo
                .compose_tree(&base_tree, &[], &excludes, false, &blobs)?;

            let parents: Vec<&str> = parent.as_deref().into_iter().collect();
            let sha = self.repo.create_commit(&tree, &parents, author, &message)?;

            let expected = parent.as_deref().unwrap_or(ZERO_OID);
            match self.repo.set_ref(METADATA_REF, &sha, Some(expected)) {
                Ok(()) => {
                    tracing::info!(checkpoint_id = %id, commit = %sha, "Wrote permanent checkpoint");
                    return Ok(sha);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_REF_RETRIES {
                        return Err(e).context("Failed to advance metadata branch");
                    }
                    tracing::debug!(
                        error = %e,
                        "Metadata branch moved during write; retrying on the new tip"
                    );
                }
            }
        }
    }

    /// Load a checkpoint shard. `CheckpointNotFound` when the branch or the
    /// shard is absent, never a partially-populated result.
    pub fn read_committed(&self, id: &CheckpointId) -> Result<CommittedCheckpoint> {
        let not_found = || EntireError::CheckpointNotFound(id.to_string());
        let Some(tip) = self.repo.read_ref(METADATA_REF)? else {
            return Err(not_found().into());
        };

        let dir = Self::shard_dir(id);
        let entries = self.repo.ls_tree(&tip)?;
        let prefix = format!("{dir}/");
        let shard: Vec<&str> = entries
            .iter()
            .filter(|e| e.path.starts_with(&prefix))
            .map(|e| e.path.as_str())
            .collect();
        if !shard.contains(&format!("{dir}/{FILE_METADATA}").as_str()) {
            return Err(not_found().into());
        }

        let read_text = |name: &str| -> Result<String> {
            let bytes = self.repo.read_blob(&tip, &format!("{dir}/{name}"))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        };

        let metadata: CheckpointMetadata = serde_json::from_slice(
            &self.repo.read_blob(&tip, &format!("{dir}/{FILE_METADATA}"))?,
        )
        .with_context(|| format!("Corrupt metadata.json for checkpoint {id}"))?;

        let mut archived_sessions = Vec::new();
        for index in 0.. {
            let transcript_path = format!("{dir}/{index}/{FILE_TRANSCRIPT}");
            if !shard.contains(&transcript_path.as_str()) {
                break;
            }
            let transcript =
                String::from_utf8_lossy(&self.repo.read_blob(&tip, &transcript_path)?).into_owned();
            let prompts = String::from_utf8_lossy(
                &self.repo.read_blob(&tip, &format!("{dir}/{index}/{FILE_PROMPT}"))?,
            )
            .into_owned();
            let session_id = metadata
                .session_ids
                .get(index + 1)
                .cloned()
                .unwrap_or_default();
            archived_sessions.push(ArchivedSession {
                session_id,
                transcript,
                prompts,
            });
        }

        Ok(CommittedCheckpoint {
            metadata,
            transcript: read_text(FILE_TRANSCRIPT)?,
            prompts: read_text(FILE_PROMPT)?,
            summary_text: read_text(FILE_SUMMARY)?,
            context: read_text(FILE_CONTEXT)?,
            archived_sessions,
        })
    }

    /// Whether the metadata branch exists locally.
    pub fn branch_exists(&self) -> Result<bool> {
        Ok(self.repo.read_ref(METADATA_REF)?.is_some())
    }
}
