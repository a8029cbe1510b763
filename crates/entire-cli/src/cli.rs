//! Command-line definitions.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "entire",
    about = "Git-native session checkpointer for AI coding agents",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Hook entry points (invoked by agent and git hooks, payload on stdin)
    Hook {
        #[command(subcommand)]
        event: HookCommands,
    },

    /// List live sessions
    Sessions,

    /// List checkpoints reachable from the current branch
    Checkpoints {
        /// Maximum commits to walk
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Restore the working copy to a past checkpoint of a session
    Rewind {
        /// Session to rewind
        #[arg(long)]
        session: String,

        /// How many checkpoints to go back (1 = most recent)
        #[arg(long, default_value_t = 1)]
        steps: usize,

        /// Show what would change without touching the worktree
        #[arg(long)]
        preview: bool,
    },

    /// Check checkpointer state for inconsistencies
    Doctor {
        /// Remove a session's state (and its shadow branch if unused)
        #[arg(long)]
        discard_session: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum HookCommands {
    /// The user submitted a prompt
    PromptSubmit,
    /// A turn finished
    TurnEnd,
    /// Fired by the git post-commit hook
    PostCommit,
    /// The agent session ended
    SessionEnd,
    /// A sub-agent produced a mid-turn checkpoint
    Subagent,
    /// Fired by the git prepare-commit-msg hook
    PrepareCommitMsg {
        /// Path to the commit message file git passes to the hook
        #[arg(long)]
        message_file: std::path::PathBuf,
    },
}
