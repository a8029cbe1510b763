//! Repository-local configuration.
//!
//! Loaded from `.entire/config.toml` at the worktree root. A missing file
//! yields defaults; a malformed file is a warning plus defaults, never a
//! hook failure. `ENTIRE_STRATEGY` overrides the configured strategy.

use anyhow::{Context, Result};
use entire_core::StrategyKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Relative path of the config file inside a worktree.
pub const CONFIG_PATH: &str = ".entire/config.toml";

/// Environment variable overriding the configured strategy.
pub const STRATEGY_ENV: &str = "ENTIRE_STRATEGY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Kill switch: hooks become no-ops when false.
    pub enabled: bool,

    /// Checkpointing strategy.
    pub strategy: StrategyKind,

    /// Identity used for shadow- and metadata-branch commits.
    pub author_name: String,
    pub author_email: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: true,
            strategy: StrategyKind::ManualCommit,
            author_name: "entire".to_string(),
            author_email: "checkpoint@entire.dev".to_string(),
        }
    }
}

impl Config {
    /// Load configuration for a worktree, applying the environment
    /// override. Never fails on missing or malformed files.
    pub fn load(worktree: &Path) -> Config {
        let mut config = match Self::read_file(&worktree.join(CONFIG_PATH)) {
            Ok(Some(config)) => config,
            Ok(None) => Config::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed config file");
                Config::default()
            }
        };

        if let Ok(value) = std::env::var(STRATEGY_ENV) {
            match StrategyKind::from_str(&value) {
                Ok(strategy) => config.strategy = strategy,
                Err(e) => tracing::warn!(value, "Ignoring {STRATEGY_ENV}: {e}"),
            }
        }
        config
    }

    fn read_file(path: &Path) -> Result<Option<Config>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(config))
    }
}
