use anyhow::Result;
use clap::Parser;
use entire_config::Config;
use entire_core::Registry;
use entire_git::Repo;
use entire_strategy::Orchestrator;

mod checkpoint_cmds;
mod cli;
mod hook_cmd;
mod session_cmds;

use cli::{Cli, Commands, HookCommands};

fn main() -> Result<()> {
    // Hooks share the user's terminal with git; logs go to stderr only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let registry = Registry::builtin();

    let cwd = std::env::current_dir()?;
    let repo = Repo::discover(&cwd)?;
    let config = Config::load(repo.workdir());
    let orchestrator = Orchestrator::new(repo, config, &registry);

    match cli.command {
        Commands::Hook { event } => match event {
            HookCommands::PromptSubmit => hook_cmd::run(&orchestrator, hook_cmd::Hook::PromptSubmit),
            HookCommands::TurnEnd => hook_cmd::run(&orchestrator, hook_cmd::Hook::TurnEnd),
            HookCommands::PostCommit => hook_cmd::run(&orchestrator, hook_cmd::Hook::PostCommit),
            HookCommands::SessionEnd => hook_cmd::run(&orchestrator, hook_cmd::Hook::SessionEnd),
            HookCommands::Subagent => hook_cmd::run(&orchestrator, hook_cmd::Hook::Subagent),
            HookCommands::PrepareCommitMsg { message_file } => {
                hook_cmd::prepare_commit_msg(&orchestrator, &message_file)
            }
        },
        Commands::Sessions => session_cmds::list(&orchestrator),
        Commands::Checkpoints { limit } => checkpoint_cmds::list(&orchestrator, limit),
        Commands::Rewind {
            session,
            steps,
            preview,
        } => session_cmds::rewind(&orchestrator, &session, steps, preview),
        Commands::Doctor { discard_session } => {
            session_cmds::doctor(&orchestrator, discard_session.as_deref())
        }
    }
}
