//! Strategy orchestrator: binds the git layer, checkpoint store, and
//! session state together behind the hook entry points.

pub mod condense;
pub mod doctor;
pub mod events;
pub mod orchestrator;
pub mod rewind;
pub mod strategy;
pub mod transcript;

pub use doctor::{DoctorReport, SessionHealth, discard_session, run_doctor};
pub use events::{
    AuthorSpec, GitCommitEvent, PromptSubmitEvent, SessionEndEvent, SubAgentCheckpointEvent,
    TurnEndEvent,
};
pub use orchestrator::Orchestrator;
pub use rewind::RewindPlan;
pub use strategy::Strategy;
