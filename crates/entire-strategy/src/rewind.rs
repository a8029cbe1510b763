//! Rewind: restore the working copy to a past temporary checkpoint.

use anyhow::{Context, Result};
use entire_git::Repo;
use entire_session::SessionState;
use entire_store::ShadowStore;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Paths never touched by rewind, regardless of agent.
const RESERVED_PREFIXES: &[&str] = &[".git", ".entire"];

/// What a rewind will do (or did).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewindPlan {
    /// Files written back from the target tree.
    pub restore: Vec<String>,
    /// Worktree files deleted because nothing protects them.
    pub delete: Vec<String>,
    /// The target checkpoint commit.
    pub target: String,
}

fn is_reserved(path: &str, reserved_dirs: &[&str]) -> bool {
    RESERVED_PREFIXES
        .iter()
        .chain(reserved_dirs.iter())
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

/// Enumerate worktree files as repo-relative, `/`-separated paths, skipping
/// reserved directories.
fn walk_worktree(root: &Path, reserved_dirs: &[&str]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let rel = path
                .strip_prefix(root)
                .context("worktree walk escaped the root")?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            if is_reserved(&rel, reserved_dirs) {
                continue;
            }
            let file_type = std::fs::symlink_metadata(&path)?.file_type();
            if file_type.is_dir() {
                stack.push(path);
            } else {
                files.push(rel);
            }
        }
    }
    files.sort_unstable();
    Ok(files)
}

/// Compute the rewind plan for `target` without mutating anything.
///
/// A worktree file is deleted only when it is (a) absent from the target
/// tree, (b) not tracked at HEAD, (c) not one of the session's
/// untracked-at-start files, and (d) not under a reserved path.
pub fn plan(
    repo: &Repo,
    state: &SessionState,
    target: &str,
    reserved_dirs: &[&str],
) -> Result<RewindPlan> {
    let target_files: BTreeMap<String, entire_git::TreeEntry> = repo
        .ls_tree(target)?
        .into_iter()
        .filter(|e| !e.path.starts_with(".entire/"))
        .map(|e| (e.path.clone(), e))
        .collect();

    let head = repo.head()?;
    let tracked_at_head: BTreeSet<String> =
        repo.ls_tree(&head)?.into_iter().map(|e| e.path).collect();
    let untracked_at_start: BTreeSet<&String> = state.untracked_files_at_start.iter().collect();

    let mut delete = Vec::new();
    for file in walk_worktree(repo.workdir(), reserved_dirs)? {
        if target_files.contains_key(&file)
            || tracked_at_head.contains(&file)
            || untracked_at_start.contains(&file)
        {
            continue;
        }
        delete.push(file);
    }

    Ok(RewindPlan {
        restore: target_files.keys().cloned().collect(),
        delete,
        target: target.to_string(),
    })
}

/// Execute a rewind: apply the plan to the worktree and reset the shadow
/// branch to the target so forward checkpoints become unreachable.
pub fn execute(
    repo: &Repo,
    state: &SessionState,
    target: &str,
    reserved_dirs: &[&str],
) -> Result<RewindPlan> {
    let rewind_plan = plan(repo, state, target, reserved_dirs)?;

    for file in &rewind_plan.delete {
        let path = repo.workdir().join(file);
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
    }

    for entry in repo
        .ls_tree(target)?
        .into_iter()
        .filter(|e| !e.path.starts_with(".entire/"))
    {
        if entry.is_symlink() {
            tracing::warn!(path = %entry.path, "Skipping symlink entry during rewind");
            continue;
        }
        let content = repo.read_blob(target, &entry.path)?;
        let path: PathBuf = repo.workdir().join(&entry.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if entry.is_executable() { 0o755 } else { 0o644 };
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .with_context(|| format!("Failed to set mode on {}", path.display()))?;
        }
    }

    ShadowStore::new(repo).reset_to(&state.base_commit, target)?;
    Ok(rewind_plan)
}
