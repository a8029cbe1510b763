//! Strategy and agent registry.
//!
//! Built once at program start and passed by reference into constructors;
//! there is no process-global state. "Default agent" and "strategy by name"
//! are map lookups on this value.

use crate::types::{AgentKind, StrategyKind};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Registry {
    strategies: HashMap<&'static str, StrategyKind>,
    agents: HashMap<&'static str, AgentKind>,
    default_strategy: StrategyKind,
    default_agent: AgentKind,
}

impl Registry {
    /// Registry with the built-in strategies and agents.
    pub fn builtin() -> Self {
        let mut strategies = HashMap::new();
        for kind in [StrategyKind::ManualCommit, StrategyKind::AutoCommit] {
            strategies.insert(kind.as_str(), kind);
        }
        let mut agents = HashMap::new();
        for kind in [AgentKind::ClaudeCode, AgentKind::GeminiCli] {
            agents.insert(kind.as_str(), kind);
        }
        Registry {
            strategies,
            agents,
            default_strategy: StrategyKind::ManualCommit,
            default_agent: AgentKind::ClaudeCode,
        }
    }

    pub fn strategy(&self, name: &str) -> Option<StrategyKind> {
        self.strategies.get(name).copied()
    }

    pub fn agent(&self, name: &str) -> Option<AgentKind> {
        self.agents.get(name).copied()
    }

    pub fn default_strategy(&self) -> StrategyKind {
        self.default_strategy
    }

    pub fn default_agent(&self) -> AgentKind {
        self.default_agent
    }

    /// Reserved worktree directories across all registered agents, used by
    /// rewind to decide what never to delete.
    pub fn reserved_dirs(&self) -> Vec<&'static str> {
        let mut dirs: Vec<&'static str> = self.agents.values().map(|a| a.reserved_dir()).collect();
        dirs.sort_unstable();
        dirs.dedup();
        dirs
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
