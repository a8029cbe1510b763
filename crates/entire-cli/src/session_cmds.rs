//! `sessions`, `rewind`, and `doctor` commands.

use anyhow::Result;
use entire_strategy::{Orchestrator, discard_session, run_doctor};

pub fn list(orchestrator: &Orchestrator<'_>) -> Result<()> {
    let sessions = orchestrator.sessions().list()?;
    if sessions.is_empty() {
        println!("No live sessions.");
        return Ok(());
    }
    for state in sessions {
        println!(
            "{}  {}  base {}  steps {}  agent {}",
            state.session_id,
            state.phase,
            &state.base_commit[..7.min(state.base_commit.len())],
            state.step_count,
            state.agent,
        );
    }
    Ok(())
}

pub fn rewind(
    orchestrator: &Orchestrator<'_>,
    session: &str,
    steps: usize,
    preview: bool,
) -> Result<()> {
    let plan = orchestrator.rewind(session, steps, preview)?;
    if preview {
        println!("Rewind to {} would:", &plan.target[..7.min(plan.target.len())]);
    } else {
        println!("Rewound to {}.", &plan.target[..7.min(plan.target.len())]);
    }
    for file in &plan.restore {
        println!("  restore {file}");
    }
    for file in &plan.delete {
        println!("  delete  {file}");
    }
    Ok(())
}

pub fn doctor(orchestrator: &Orchestrator<'_>, discard: Option<&str>) -> Result<()> {
    if let Some(session_id) = discard {
        discard_session(orchestrator.repo(), orchestrator.sessions(), session_id)?;
        println!("Discarded session '{session_id}'.");
        return Ok(());
    }

    let report = run_doctor(orchestrator.repo(), orchestrator.sessions())?;
    println!(
        "metadata branch: {}",
        if report.metadata_branch_exists {
            "present"
        } else {
            "absent"
        }
    );
    for session in &report.sessions {
        let note = if session.base_resolvable {
            ""
        } else {
            "  (base commit unresolvable)"
        };
        println!(
            "session {}  {}  base {}{}",
            session.session_id,
            session.phase,
            &session.base_commit[..7.min(session.base_commit.len())],
            note,
        );
    }
    for branch in &report.orphaned_shadow_branches {
        println!("orphaned shadow branch: {branch}");
    }
    for file in &report.corrupt_state_files {
        println!("corrupt state file: {file}");
    }
    if report.is_healthy() {
        println!("ok");
    }
    Ok(())
}
