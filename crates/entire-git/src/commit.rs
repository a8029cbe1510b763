//! Commit reading, creation, and the plumbing amend.

use crate::repo::Repo;
use anyhow::{Context, Result, bail};

/// Commit author/committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Author {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Identity used when no author reaches a hook payload.
    pub fn checkpointer() -> Self {
        Author::new("entire", "checkpoint@entire.dev")
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// One commit as read back from history.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub sha: String,
    pub parents: Vec<String>,
    pub message: String,
}

// Field and record separators for --format parsing. %x01/%x02 cannot appear
// in commit messages produced by git.
const FIELD_SEP: char = '\u{1}';
const RECORD_SEP: char = '\u{2}';

impl Repo {
    /// Walk first-parent history from `from`, newest first, stopping at
    /// `stop_at` (exclusive) or after `limit` commits.
    pub fn walk_commits(
        &self,
        from: &str,
        stop_at: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitInfo>> {
        let max = format!("--max-count={limit}");
        let format = format!("--format=%H{FIELD_SEP}%P{FIELD_SEP}%B{RECORD_SEP}");
        let stdout = self.git(&["log", "--first-parent", &max, &format, from])?;

        let mut commits = Vec::new();
        for record in stdout.split(RECORD_SEP) {
            let record = record.trim_start_matches('\n');
            if record.trim().is_empty() {
                continue;
            }
            let mut fields = record.splitn(3, FIELD_SEP);
            let sha = fields.next().unwrap_or_default().trim().to_string();
            let parents = fields
                .next()
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect();
            let message = fields.next().unwrap_or_default().to_string();
            if let Some(stop) = stop_at
                && sha == stop
            {
                break;
            }
            commits.push(CommitInfo {
                sha,
                parents,
                message,
            });
        }
        Ok(commits)
    }

    /// Full message of a single commit.
    pub fn commit_message(&self, sha: &str) -> Result<String> {
        self.git(&["log", "-1", "--format=%B", sha])
    }

    /// The tree a commit points at.
    pub fn commit_tree(&self, commitish: &str) -> Result<String> {
        let spec = format!("{commitish}^{{tree}}");
        Ok(self.git(&["rev-parse", &spec])?.trim().to_string())
    }

    /// Create a commit object for `tree` with the given parents. The same
    /// identity is used for author and committer.
    pub fn create_commit(
        &self,
        tree: &str,
        parents: &[&str],
        author: &Author,
        message: &str,
    ) -> Result<String> {
        let mut args: Vec<&str> = vec!["commit-tree", tree];
        for parent in parents.iter().copied() {
            args.push("-p");
            args.push(parent);
        }
        let envs = [
            ("GIT_AUTHOR_NAME", author.name.as_str()),
            ("GIT_AUTHOR_EMAIL", author.email.as_str()),
            ("GIT_COMMITTER_NAME", author.name.as_str()),
            ("GIT_COMMITTER_EMAIL", author.email.as_str()),
        ];
        let stdout = self.git_env(&args, &envs, Some(message.as_bytes()))?;
        let sha = String::from_utf8_lossy(&stdout).trim().to_string();
        if sha.is_empty() {
            bail!("git commit-tree produced no id");
        }
        Ok(sha)
    }

    /// Replace the message of the current HEAD commit, preserving its tree,
    /// parents, and author.
    ///
    /// This is an amend done with plumbing: a fresh commit object plus a
    /// compare-and-swap `update-ref`, so post-commit hooks do not re-fire
    /// and a concurrent ref move makes the swap fail instead of clobbering.
    pub fn rewrite_head_message(&self, new_message: &str) -> Result<String> {
        let head = self.head()?;
        let raw = self.git(&[
            "log",
            "-1",
            "--format=%T%x01%P%x01%an%x01%ae%x01%aD%x01%cn%x01%ce",
            &head,
        ])?;
        let fields: Vec<&str> = raw.trim_end_matches('\n').split(FIELD_SEP).collect();
        if fields.len() != 7 {
            bail!("unexpected git log format output for {head}");
        }
        let (tree, parents, author_name, author_email, author_date, committer_name, committer_email) = (
            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6],
        );

        let mut args: Vec<&str> = vec!["commit-tree", tree];
        for parent in parents.split_whitespace() {
            args.push("-p");
            args.push(parent);
        }
        let envs = [
            ("GIT_AUTHOR_NAME", author_name),
            ("GIT_AUTHOR_EMAIL", author_email),
            ("GIT_AUTHOR_DATE", author_date),
            ("GIT_COMMITTER_NAME", committer_name),
            ("GIT_COMMITTER_EMAIL", committer_email),
        ];
        let stdout = self.git_env(&args, &envs, Some(new_message.as_bytes()))?;
        let new_sha = String::from_utf8_lossy(&stdout).trim().to_string();

        self.git(&["update-ref", "HEAD", &new_sha, &head])
            .context("HEAD moved while amending")?;
        Ok(new_sha)
    }
}
