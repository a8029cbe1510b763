//! `checkpoints` command: walk the current branch for checkpoint trailers.

use anyhow::Result;
use entire_git::trailers;
use entire_store::CommittedStore;
use entire_strategy::Orchestrator;

pub fn list(orchestrator: &Orchestrator<'_>, limit: usize) -> Result<()> {
    let repo = orchestrator.repo();
    let head = repo.head()?;
    let store = CommittedStore::new(repo);

    let mut found = 0usize;
    for commit in repo.walk_commits(&head, None, limit)? {
        let Some(id) = trailers::checkpoint_id(&commit.message) else {
            continue;
        };
        found += 1;
        match store.read_committed(&id) {
            Ok(checkpoint) => {
                let summary = checkpoint
                    .summary_text
                    .lines()
                    .next()
                    .unwrap_or("")
                    .to_string();
                println!(
                    "{}  {}  {}  {} session(s)  {}",
                    id,
                    &commit.sha[..7],
                    checkpoint.metadata.created_at.format("%Y-%m-%d %H:%M"),
                    checkpoint.metadata.session_count,
                    summary,
                );
            }
            Err(_) => {
                println!("{}  {}  (not in local metadata branch)", id, &commit.sha[..7]);
            }
        }
    }
    if found == 0 {
        println!("No checkpoints on this branch.");
    }
    Ok(())
}
