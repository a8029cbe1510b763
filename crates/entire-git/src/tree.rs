//! Tree composition and inspection.
//!
//! Trees are composed in a throwaway index file so the user's real index is
//! never touched from a hook.

use crate::repo::Repo;
use anyhow::{Context, Result};
use std::path::Path;

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub oid: String,
    pub path: String,
}

impl TreeEntry {
    pub fn is_executable(&self) -> bool {
        self.mode == "100755"
    }

    pub fn is_symlink(&self) -> bool {
        self.mode == "120000"
    }
}

impl Repo {
    /// The id of the empty tree, used as composition base for rootless
    /// metadata-branch commits.
    pub fn empty_tree(&self) -> Result<String> {
        let stdout = self.git_env(&["hash-object", "-t", "tree", "--stdin", "-w"], &[], Some(b""))?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// Build a tree from `base_tree` plus working-copy and in-memory
    /// overlays:
    ///
    /// - `snapshot_all` stages the whole working copy (gitignore respected);
    ///   otherwise only `includes` (additions, modifications, and deletions
    ///   alike) are re-staged over the base.
    /// - `excludes` are removed from the result.
    /// - `extra_blobs` are written as regular files at their given
    ///   repo-relative paths.
    pub fn compose_tree(
        &self,
        base_tree: &str,
        includes: &[String],
        excludes: &[String],
        snapshot_all: bool,
        extra_blobs: &[(String, Vec<u8>)],
    ) -> Result<String> {
        let scratch = tempfile::tempdir_in(self.git_dir())
            .context("Failed to create scratch dir for index composition")?;
        let index_path = scratch.path().join("index");
        let index = index_path
            .to_str()
            .context("scratch index path is not valid UTF-8")?
            .to_string();
        let envs: &[(&str, &str)] = &[("GIT_INDEX_FILE", index.as_str())];

        self.git_env(&["read-tree", base_tree], envs, None)?;

        if snapshot_all {
            self.git_env(&["add", "-A", "--", "."], envs, None)?;
        } else if !includes.is_empty() {
            let stdin = join_z(includes);
            self.git_env(
                &["update-index", "--add", "--remove", "-z", "--stdin"],
                envs,
                Some(stdin.as_bytes()),
            )?;
        }

        if !excludes.is_empty() {
            let stdin = join_z(excludes);
            self.git_env(
                &["update-index", "--force-remove", "-z", "--stdin"],
                envs,
                Some(stdin.as_bytes()),
            )?;
        }

        for (path, content) in extra_blobs {
            let blob = self.git_env(&["hash-object", "-w", "--stdin"], &[], Some(content))?;
            let blob = String::from_utf8_lossy(&blob).trim().to_string();
            let cacheinfo = format!("100644,{blob},{path}");
            self.git_env(&["update-index", "--add", "--cacheinfo", &cacheinfo], envs, None)?;
        }

        let tree = self.git_env(&["write-tree"], envs, None)?;
        Ok(String::from_utf8_lossy(&tree).trim().to_string())
    }

    /// Recursive listing of `treeish`.
    pub fn ls_tree(&self, treeish: &str) -> Result<Vec<TreeEntry>> {
        let stdout = self.git_env(&["ls-tree", "-r", "-z", "--full-tree", treeish], &[], None)?;
        let text = String::from_utf8_lossy(&stdout);
        let mut entries = Vec::new();
        for record in text.split('\0') {
            if record.is_empty() {
                continue;
            }
            // "<mode> <type> <oid>\t<path>"
            let Some((meta, path)) = record.split_once('\t') else {
                continue;
            };
            let mut fields = meta.split_whitespace();
            let mode = fields.next().unwrap_or_default().to_string();
            let _object_type = fields.next();
            let oid = fields.next().unwrap_or_default().to_string();
            entries.push(TreeEntry {
                mode,
                oid,
                path: path.to_string(),
            });
        }
        Ok(entries)
    }

    /// Read a blob at `path` inside `treeish`.
    pub fn read_blob(&self, treeish: &str, path: &str) -> Result<Vec<u8>> {
        let spec = format!("{treeish}:{path}");
        self.git_env(&["cat-file", "blob", &spec], &[], None)
    }

    /// Untracked (and not ignored) files in the working copy.
    pub fn untracked_files(&self) -> Result<Vec<String>> {
        let stdout = self.git_env(
            &["ls-files", "--others", "--exclude-standard", "-z"],
            &[],
            None,
        )?;
        let text = String::from_utf8_lossy(&stdout);
        Ok(text
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn join_z(paths: &[String]) -> String {
    let mut joined = String::new();
    for path in paths {
        joined.push_str(path);
        joined.push('\0');
    }
    joined
}

/// Load a metadata directory from disk into `(relative path, content)`
/// pairs. Symbolic links are skipped, never followed: a symlink is not a
/// tree entry.
pub fn load_metadata_dir(root: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read metadata dir {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let file_type = std::fs::symlink_metadata(&path)?.file_type();
            if file_type.is_symlink() {
                tracing::warn!(path = %path.display(), "Skipping symlink in metadata dir");
                continue;
            }
            if file_type.is_dir() {
                stack.push(path);
            } else {
                let rel = path
                    .strip_prefix(root)
                    .context("metadata file escaped its root")?
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                let content = std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                files.push((rel, content));
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
