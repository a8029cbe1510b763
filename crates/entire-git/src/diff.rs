//! Line-level diff accounting for attribution.
//!
//! Numbers come from `--numstat`: text files only (binary entries are
//! skipped), checkpoint metadata paths excluded.

use crate::repo::Repo;
use anyhow::Result;
use std::collections::BTreeMap;

/// Prefix of paths that never count toward attribution.
const METADATA_PREFIX: &str = ".entire/";

/// Aggregated line churn between two states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineDiff {
    pub added: usize,
    pub removed: usize,
    pub per_file_added: BTreeMap<String, usize>,
}

impl LineDiff {
    fn accumulate(&mut self, numstat: &str) {
        for line in numstat.lines() {
            let mut fields = line.split('\t');
            let (Some(added), Some(removed), Some(path)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            // Binary files report "-" counts.
            let (Ok(added), Ok(removed)) = (added.parse::<usize>(), removed.parse::<usize>())
            else {
                continue;
            };
            if path.starts_with(METADATA_PREFIX) {
                continue;
            }
            self.added += added;
            self.removed += removed;
            if added > 0 {
                *self.per_file_added.entry(path.to_string()).or_default() += added;
            }
        }
    }

    /// Paths that changed at all.
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

impl Repo {
    /// Line diff between two trees (or commits).
    pub fn diff_tree_lines(&self, a: &str, b: &str) -> Result<LineDiff> {
        let stdout = self.git(&["diff-tree", "-r", "--numstat", a, b])?;
        let mut diff = LineDiff::default();
        diff.accumulate(&stdout);
        Ok(diff)
    }

    /// Line diff between a commit (or tree) and the working copy.
    /// Untracked files are invisible to `git diff` and do not count.
    pub fn diff_workdir_lines(&self, base: &str) -> Result<LineDiff> {
        let stdout = self.git(&["diff", "--numstat", base])?;
        let mut diff = LineDiff::default();
        diff.accumulate(&stdout);
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::testutil::{git, init_repo};
    use tempfile::tempdir;

    #[test]
    fn test_diff_tree_lines_counts_additions_and_removals() {
        let tmp = tempdir().unwrap();
        init_repo(tmp.path());
        let repo = Repo::discover(tmp.path()).unwrap();
        let first = repo.head().unwrap();

        std::fs::write(tmp.path().join("README.md"), "hello\nworld\n").unwrap();
        std::fs::write(tmp.path().join("new.txt"), "one\ntwo\nthree\n").unwrap();
        git(tmp.path(), &["add", "."]);
        git(tmp.path(), &["commit", "-q", "-m", "expand"]);
        let second = repo.head().unwrap();

        let diff = repo.diff_tree_lines(&first, &second).unwrap();
        // README gained "world" (1 added); new.txt adds 3.
        assert_eq!(diff.added, 4);
        assert_eq!(diff.removed, 0);
        assert_eq!(diff.per_file_added.get("new.txt"), Some(&3));
        assert_eq!(diff.per_file_added.get("README.md"), Some(&1));
    }

    #[test]
    fn test_diff_skips_metadata_paths() {
        let tmp = tempdir().unwrap();
        init_repo(tmp.path());
        let repo = Repo::discover(tmp.path()).unwrap();
        let first = repo.head().unwrap();

        std::fs::create_dir_all(tmp.path().join(".entire/metadata/s")).unwrap();
        std::fs::write(tmp.path().join(".entire/metadata/s/prompt.txt"), "p\n").unwrap();
        std::fs::write(tmp.path().join("real.txt"), "r\n").unwrap();
        git(tmp.path(), &["add", "-f", "."]);
        git(tmp.path(), &["commit", "-q", "-m", "mixed"]);
        let second = repo.head().unwrap();

        let diff = repo.diff_tree_lines(&first, &second).unwrap();
        assert_eq!(diff.added, 1);
        assert!(diff.per_file_added.contains_key("real.txt"));
        assert!(!diff.per_file_added.keys().any(|p| p.starts_with(".entire/")));
    }

    #[test]
    fn test_diff_skips_binary_files() {
        let tmp = tempdir().unwrap();
        init_repo(tmp.path());
        let repo = Repo::discover(tmp.path()).unwrap();
        let first = repo.head().unwrap();

        std::fs::write(tmp.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();
        git(tmp.path(), &["add", "."]);
        git(tmp.path(), &["commit", "-q", "-m", "binary"]);
        let second = repo.head().unwrap();

        let diff = repo.diff_tree_lines(&first, &second).unwrap();
        assert_eq!(diff.added, 0);
        assert_eq!(diff.removed, 0);
    }

    #[test]
    fn test_diff_workdir_lines_sees_unstaged_edits() {
        let tmp = tempdir().unwrap();
        init_repo(tmp.path());
        let repo = Repo::discover(tmp.path()).unwrap();
        let head = repo.head().unwrap();

        std::fs::write(tmp.path().join("README.md"), "hello\nedited\n").unwrap();
        let diff = repo.diff_workdir_lines(&head).unwrap();
        assert_eq!(diff.added, 1);
        assert_eq!(diff.per_file_added.get("README.md"), Some(&1));
    }

    #[test]
    fn test_identical_trees_diff_empty() {
        let tmp = tempdir().unwrap();
        init_repo(tmp.path());
        let repo = Repo::discover(tmp.path()).unwrap();
        let head = repo.head().unwrap();
        let diff = repo.diff_tree_lines(&head, &head).unwrap();
        assert!(diff.is_empty());
    }
}
