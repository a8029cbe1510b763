//! Shared types for the entire checkpointer: errors, checkpoint IDs,
//! commit-message trailer keys, and the strategy/agent registry.

pub mod error;
pub mod id;
pub mod registry;
pub mod trailer;
pub mod types;
pub mod validate;

pub use error::EntireError;
pub use id::CheckpointId;
pub use registry::Registry;
pub use types::{AgentKind, StrategyKind, TokenUsage};
pub use validate::validate_session_id;
