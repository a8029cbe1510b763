//! Git object layer: everything the checkpointer does against the host
//! repository goes through the `git` binary via [`Repo`].
//!
//! Plumbing commands only where porcelain is unsafe in hook context; all
//! invocations separate paths with `--` and surface stderr on failure.

pub mod commit;
pub mod diff;
pub mod repo;
pub mod trailers;
pub mod tree;

pub use commit::{Author, CommitInfo};
pub use diff::LineDiff;
pub use repo::Repo;
pub use tree::TreeEntry;
