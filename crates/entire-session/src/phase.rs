//! Session lifecycle phase machine.
//!
//! A pure function from `(current phase, event)` to `(next phase, actions)`.
//! No I/O happens here: the orchestrator executes the actions in order,
//! handles their failures, and persists the result. Transitions are
//! suppressed wholesale by the orchestrator while a rebase or merge is in
//! progress.

use serde::{Deserialize, Serialize};

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// A turn is running.
    #[default]
    Active,
    /// A turn is running and the user committed mid-turn; a deferred
    /// condensation is pending.
    ActiveCommitted,
    /// Between turns.
    Idle,
    /// Lifecycle complete. Terminal: nothing revives an ended session, its
    /// only remaining transition is the `GitCommit` self-loop that flushes
    /// leftover work.
    Ended,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Active => "active",
            Phase::ActiveCommitted => "active_committed",
            Phase::Idle => "idle",
            Phase::Ended => "ended",
        };
        write!(f, "{name}")
    }
}

/// Hook events driving the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    PromptSubmit,
    TurnEnd,
    GitCommit,
    SessionEnd,
}

/// Strategy actions emitted by a transition, to be executed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Adopt the commit's checkpoint-id trailer or reserve a deterministic
    /// one; record it on session state.
    SetPendingCheckpointId,
    /// Rename the shadow branch from the old base's name to the new HEAD's.
    MigrateShadow,
    /// Advance `base_commit` to the new HEAD. Never touches
    /// `attribution_base_commit`.
    UpdateBaseCommit,
    /// Run the deferred condensation using the pending checkpoint id.
    CondenseDeferred,
    /// Drop the pending checkpoint id.
    ClearPending,
    /// Condense unless the transcript cursor already covers the transcript.
    CondenseIfNewContent,
    /// ENDED flush: condense only when files were touched and transcript
    /// content is new; otherwise discard the session without a metadata
    /// write.
    CondenseIfFilesTouchedAndNewContent,
    /// After a successful IDLE/ENDED condensation the branch is no longer
    /// needed by this session; delete it unless another live session maps
    /// to it.
    MigrateOrDeleteShadow,
}

/// Result of feeding one event to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Phase,
    pub actions: Vec<Action>,
}

impl Transition {
    fn to(next: Phase) -> Self {
        Transition {
            next,
            actions: Vec::new(),
        }
    }

    fn with(next: Phase, actions: &[Action]) -> Self {
        Transition {
            next,
            actions: actions.to_vec(),
        }
    }
}

/// Compute the transition for `event` from `current`.
///
/// `current == None` models a session that does not exist yet: only
/// `PromptSubmit` creates one. Returns `None` when there is no session and
/// the event cannot create it. Unlisted `(phase, event)` combinations are
/// identity transitions with no actions.
pub fn transition(current: Option<Phase>, event: Event) -> Option<Transition> {
    use Action::*;
    use Event::*;
    use Phase::*;

    let Some(phase) = current else {
        return match event {
            PromptSubmit => Some(Transition::to(Active)),
            _ => None,
        };
    };

    let transition = match (phase, event) {
        // Ended is terminal; a new prompt needs a new session id.
        (Ended, PromptSubmit) => Transition::to(Ended),
        (ActiveCommitted, PromptSubmit) => Transition::with(Active, &[ClearPending]),
        (_, PromptSubmit) => Transition::to(Active),

        (Active, TurnEnd) => Transition::to(Idle),
        (ActiveCommitted, TurnEnd) => Transition::with(Idle, &[CondenseDeferred, ClearPending]),

        (Active, GitCommit) => Transition::with(
            ActiveCommitted,
            &[SetPendingCheckpointId, MigrateShadow, UpdateBaseCommit],
        ),
        (ActiveCommitted, GitCommit) => {
            Transition::with(ActiveCommitted, &[MigrateShadow, UpdateBaseCommit])
        }
        (Idle, GitCommit) => Transition::with(
            Idle,
            &[CondenseIfNewContent, UpdateBaseCommit, MigrateOrDeleteShadow],
        ),
        (Ended, GitCommit) => Transition::with(Ended, &[CondenseIfFilesTouchedAndNewContent]),

        (Active, SessionEnd) | (ActiveCommitted, SessionEnd) | (Idle, SessionEnd) => {
            Transition::to(Ended)
        }

        // Everything else changes nothing.
        (phase, _) => Transition::to(phase),
    };
    Some(transition)
}
