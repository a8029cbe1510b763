use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Checkpointing strategy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// User-driven: condensation is deferred to the user's `git commit`.
    ManualCommit,
    /// Agent-driven: every turn end condenses immediately.
    AutoCommit,
}

impl StrategyKind {
    /// Returns the wire name recorded in trailers and `metadata.json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualCommit => "manual-commit",
            Self::AutoCommit => "auto-commit",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual-commit" => Ok(Self::ManualCommit),
            "auto-commit" => Ok(Self::AutoCommit),
            other => Err(format!(
                "Invalid strategy '{}'. Valid values: manual-commit, auto-commit",
                other
            )),
        }
    }
}

/// Agents with first-class hook adapters.
///
/// Agent names on session state and checkpoints are plain strings so an
/// unrecognized agent still round-trips; this enum exists for registry
/// defaults and adapter dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentKind {
    ClaudeCode,
    GeminiCli,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::GeminiCli => "gemini-cli",
        }
    }

    /// Directory the agent keeps its own state in, protected from rewind.
    pub fn reserved_dir(&self) -> &'static str {
        match self {
            Self::ClaudeCode => ".claude",
            Self::GeminiCli => ".gemini",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "claude-code" => Some(Self::ClaudeCode),
            "gemini-cli" => Some(Self::GeminiCli),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token accounting passed through from agent transcripts into checkpoint
/// metadata.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,

    #[serde(default)]
    pub output: u64,

    #[serde(default)]
    pub cache_read: u64,

    #[serde(default)]
    pub api_calls: u64,
}

impl TokenUsage {
    /// Saturating element-wise accumulation.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.cache_read = self.cache_read.saturating_add(other.cache_read);
        self.api_calls = self.api_calls.saturating_add(other.api_calls);
    }
}
