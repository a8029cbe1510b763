//! Durable per-session state and the phase state machine.

pub mod phase;
pub mod state;
pub mod store;

pub use phase::{Action, Event, Phase, Transition, transition};
pub use state::{PromptAttribution, SessionState};
pub use store::SessionStore;
