//! Hook dispatch.
//!
//! Each hook reads one JSON payload from stdin (the generic shape of the
//! typed events; agent-specific payload translation happens in the agents'
//! own hook scripts). Hooks never fail the user's git operation: every
//! error below the boundary is logged and swallowed, except the misuse
//! kinds that would corrupt state if ignored.

use anyhow::{Context, Result};
use entire_core::EntireError;
use entire_git::trailers;
use entire_strategy::{
    GitCommitEvent, Orchestrator, PromptSubmitEvent, SessionEndEvent, SubAgentCheckpointEvent,
    TurnEndEvent,
};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub enum Hook {
    PromptSubmit,
    TurnEnd,
    PostCommit,
    SessionEnd,
    Subagent,
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read hook payload from stdin")?;
    Ok(buffer)
}

pub fn run(orchestrator: &Orchestrator<'_>, hook: Hook) -> Result<()> {
    let result = dispatch(orchestrator, hook);
    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            if e.downcast_ref::<EntireError>()
                .is_some_and(EntireError::is_hard_failure)
            {
                return Err(e);
            }
            tracing::warn!(error = %format!("{e:#}"), "Hook failed (non-fatal)");
            Ok(())
        }
    }
}

fn dispatch(orchestrator: &Orchestrator<'_>, hook: Hook) -> Result<()> {
    match hook {
        Hook::PromptSubmit => {
            let event: PromptSubmitEvent =
                serde_json::from_str(&read_stdin()?).context("Invalid prompt-submit payload")?;
            orchestrator.handle_prompt_submit(&event)
        }
        Hook::TurnEnd => {
            let event: TurnEndEvent =
                serde_json::from_str(&read_stdin()?).context("Invalid turn-end payload")?;
            orchestrator.handle_turn_end(&event)
        }
        Hook::PostCommit => {
            // post-commit passes no payload; tolerate an empty stdin.
            let raw = read_stdin().unwrap_or_default();
            let event: GitCommitEvent = if raw.trim().is_empty() {
                GitCommitEvent::default()
            } else {
                serde_json::from_str(&raw).context("Invalid post-commit payload")?
            };
            orchestrator.handle_post_commit(&event)
        }
        Hook::SessionEnd => {
            let event: SessionEndEvent =
                serde_json::from_str(&read_stdin()?).context("Invalid session-end payload")?;
            orchestrator.handle_session_end(&event)
        }
        Hook::Subagent => {
            let event: SubAgentCheckpointEvent =
                serde_json::from_str(&read_stdin()?).context("Invalid subagent payload")?;
            orchestrator.handle_subagent_checkpoint(&event)
        }
    }
}

/// prepare-commit-msg: reserve the checkpoint id and append its trailer to
/// the message file unless one is already present.
pub fn prepare_commit_msg(orchestrator: &Orchestrator<'_>, message_file: &Path) -> Result<()> {
    let result = (|| -> Result<()> {
        let Some(id) = orchestrator.reserve_checkpoint_id()? else {
            return Ok(());
        };
        let message = std::fs::read_to_string(message_file)
            .with_context(|| format!("Failed to read {}", message_file.display()))?;
        if trailers::checkpoint_id(&message).is_some() {
            return Ok(());
        }
        let updated = trailers::append_trailer(
            &message,
            entire_core::trailer::TRAILER_CHECKPOINT,
            id.as_str(),
        );
        std::fs::write(message_file, updated)
            .with_context(|| format!("Failed to write {}", message_file.display()))?;
        Ok(())
    })();

    if let Err(e) = result {
        tracing::warn!(error = %format!("{e:#}"), "prepare-commit-msg hook failed (non-fatal)");
    }
    Ok(())
}
