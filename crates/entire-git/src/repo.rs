//! Repository discovery and the low-level `git` invocation helpers.

use anyhow::{Context, Result, bail};
use entire_core::EntireError;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Handle on a discovered repository worktree.
///
/// `git_dir` is the per-worktree git directory; `common_dir` is the shared
/// one. They are equal for the main worktree.
#[derive(Debug, Clone)]
pub struct Repo {
    workdir: PathBuf,
    git_dir: PathBuf,
    common_dir: PathBuf,
}

impl Repo {
    /// Discover the repository containing `path`.
    pub fn discover(path: &Path) -> Result<Repo> {
        let output = Command::new("git")
            .args([
                "rev-parse",
                "--show-toplevel",
                "--absolute-git-dir",
                "--git-common-dir",
            ])
            .current_dir(path)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE")
            .output()
            .context("Failed to run git rev-parse")?;

        if !output.status.success() {
            return Err(EntireError::NotARepo(path.to_path_buf()).into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        let workdir = PathBuf::from(
            lines
                .next()
                .context("rev-parse returned no toplevel (bare repository?)")?,
        );
        let git_dir = PathBuf::from(lines.next().context("rev-parse returned no git dir")?);
        let common_raw = lines.next().context("rev-parse returned no common dir")?;

        // --git-common-dir may be relative to the invocation directory.
        let common_dir = {
            let candidate = PathBuf::from(common_raw);
            if candidate.is_absolute() {
                candidate
            } else {
                path.join(candidate)
            }
        };
        let common_dir = std::fs::canonicalize(&common_dir).unwrap_or(common_dir);
        let git_dir = std::fs::canonicalize(&git_dir).unwrap_or(git_dir);

        Ok(Repo {
            workdir,
            git_dir,
            common_dir,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    /// Worktree id of this worktree: empty for the main worktree, otherwise
    /// the directory name under `<common-dir>/worktrees/` (stable across
    /// `git worktree move`).
    pub fn worktree_id(&self) -> String {
        if self.git_dir == self.common_dir {
            return String::new();
        }
        self.git_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Command builder scrubbed of the repo-location variables git exports
    /// into hook processes; discovery is by working directory only.
    fn base_command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.workdir)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE");
        cmd
    }

    /// Run git in the worktree, returning the raw output.
    pub(crate) fn git_raw(&self, args: &[&str]) -> Result<Output> {
        self.base_command()
            .args(args)
            .output()
            .with_context(|| format!("Failed to run git {}", args.first().unwrap_or(&"")))
    }

    /// Run git and bail with stderr on non-zero exit; returns stdout.
    pub(crate) fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.git_raw(args)?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Like [`git`](Self::git) but with extra environment variables and an
    /// optional stdin payload. Used by tree composition and commit plumbing.
    pub(crate) fn git_env(
        &self,
        args: &[&str],
        envs: &[(&str, &str)],
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let mut cmd = self.base_command();
        cmd.args(args);
        for (key, value) in envs {
            cmd.env(key, value);
        }
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn git {}", args.first().unwrap_or(&"")))?;

        if let Some(payload) = stdin {
            use std::io::Write;
            let mut handle = child.stdin.take().context("stdin not piped")?;
            handle.write_all(payload).context("Failed to write to git stdin")?;
        }

        let output = child.wait_with_output().context("Failed to wait for git")?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }

    /// Resolve HEAD to a full commit SHA.
    pub fn head(&self) -> Result<String> {
        let output = self.git_raw(&["rev-parse", "--verify", "--quiet", "HEAD^{commit}"])?;
        if !output.status.success() {
            return Err(EntireError::EmptyRepo.into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Resolve an arbitrary revision to a full SHA, `None` if it does not
    /// resolve.
    pub fn resolve(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{rev}^{{commit}}");
        let output = self.git_raw(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    /// Read a fully-qualified ref (e.g. `refs/heads/entire/abc1234`).
    pub fn read_ref(&self, name: &str) -> Result<Option<String>> {
        let output = self.git_raw(&["show-ref", "--verify", "--hash", name])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    /// Point `name` at `oid`, creating the ref if needed. When `old` is
    /// given the update is compare-and-swap and fails if the ref moved.
    pub fn set_ref(&self, name: &str, oid: &str, old: Option<&str>) -> Result<()> {
        match old {
            Some(expected) => self.git(&["update-ref", name, oid, expected])?,
            None => self.git(&["update-ref", name, oid])?,
        };
        Ok(())
    }

    pub fn delete_ref(&self, name: &str) -> Result<()> {
        self.git(&["update-ref", "-d", name])?;
        Ok(())
    }

    /// First parent of a commit, `None` for a root commit.
    pub fn first_parent(&self, commit: &str) -> Result<Option<String>> {
        let spec = format!("{commit}^");
        self.resolve(&spec)
    }

    /// Refs under `prefix` as `(full name, oid)` pairs.
    pub fn list_refs(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let stdout = self.git(&[
            "for-each-ref",
            "--format=%(refname) %(objectname)",
            prefix,
        ])?;
        let mut refs = Vec::new();
        for line in stdout.lines() {
            if let Some((name, oid)) = line.split_once(' ') {
                refs.push((name.to_string(), oid.to_string()));
            }
        }
        Ok(refs)
    }

    /// Whether `oid` names an object that exists and is a commit.
    pub fn commit_exists(&self, oid: &str) -> Result<bool> {
        let spec = format!("{oid}^{{commit}}");
        let output = self.git_raw(&["cat-file", "-e", &spec])?;
        Ok(output.status.success())
    }

    /// Whether `a` is an ancestor of `b`.
    pub fn is_ancestor(&self, a: &str, b: &str) -> Result<bool> {
        let output = self.git_raw(&["merge-base", "--is-ancestor", a, b])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => bail!(
                "git merge-base --is-ancestor failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }

    /// Detect operational git state (rebase, merge, cherry-pick, revert in
    /// progress) that must suppress phase transitions.
    pub fn rebase_or_merge_in_progress(&self) -> bool {
        const MARKERS: &[&str] = &[
            "rebase-merge",
            "rebase-apply",
            "MERGE_HEAD",
            "CHERRY_PICK_HEAD",
            "REVERT_HEAD",
        ];
        MARKERS.iter().any(|m| self.git_dir.join(m).exists())
    }

    /// Enumerate worktrees as `(path, worktree id)`; the main worktree has
    /// an empty id.
    pub fn list_worktrees(&self) -> Result<Vec<(PathBuf, String)>> {
        let stdout = self.git(&["worktree", "list", "--porcelain"])?;
        let mut paths: Vec<PathBuf> = Vec::new();
        for line in stdout.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                paths.push(PathBuf::from(path));
            }
        }

        // Map linked worktree paths back to their internal directory name by
        // reading <common-dir>/worktrees/<id>/gitdir.
        let mut result = Vec::with_capacity(paths.len());
        let worktrees_dir = self.common_dir.join("worktrees");
        for path in paths {
            let mut id = String::new();
            if worktrees_dir.is_dir() {
                for entry in std::fs::read_dir(&worktrees_dir)
                    .with_context(|| format!("Failed to read {}", worktrees_dir.display()))?
                {
                    let entry = entry?;
                    let gitdir_file = entry.path().join("gitdir");
                    let Ok(contents) = std::fs::read_to_string(&gitdir_file) else {
                        continue;
                    };
                    // gitdir file holds "<worktree>/.git"
                    let recorded = PathBuf::from(contents.trim());
                    if recorded.parent() == Some(path.as_path()) {
                        id = entry.file_name().to_string_lossy().into_owned();
                        break;
                    }
                }
            }
            result.push((path, id));
        }
        Ok(result)
    }
}
