//! Argument parsing and dispatch (SPEC_FULL.md §6.4). Pure plumbing: every
//! subcommand loads config, calls exactly one `workflow` function, and
//! renders the result -- no orchestration logic lives here.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::command;

#[derive(Debug, Parser)]
#[command(name = "ppg", about = "Orchestrates parallel AI coding agents across git worktrees and tmux panes")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Render command output as pretty JSON instead of a table.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize a project for ppg orchestration.
    Init,

    /// Spawn a new agent, creating its worktree if needed.
    Spawn {
        worktree: String,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long = "prompt-file")]
        prompt_file: Option<PathBuf>,
        #[arg(long)]
        base: Option<String>,
    },

    /// Re-launch an agent's last prompt in its existing pane.
    Restart { agent_id: String },

    /// Kill one agent, or every non-terminal agent with --all.
    Kill {
        agent_id: Option<String>,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        worktree: Option<String>,
    },

    /// Block until every given agent reaches a terminal state.
    Wait {
        agent_ids: Vec<String>,
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        poll: Option<u64>,
    },

    /// Show every worktree and agent's current status.
    Status {
        /// Keep refreshing and reprinting every few seconds.
        #[arg(long)]
        watch: bool,
    },

    /// Merge a worktree's branch into the current (or --into) branch.
    Merge {
        worktree: String,
        #[arg(long)]
        into: Option<String>,
        #[arg(long)]
        squash: bool,
        #[arg(long)]
        force: bool,
    },

    /// Tear down a worktree's checkout and branch.
    Clean {
        worktree: String,
        #[arg(long)]
        force: bool,
    },

    /// Collect agent result documents.
    Result {
        worktree: Option<String>,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Manage cron-scheduled swarm/prompt invocations.
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Debug, Subcommand)]
enum ScheduleAction {
    /// List configured schedule entries.
    List,
    /// Add a new schedule entry.
    Add {
        name: String,
        #[arg(long)]
        cron: String,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        swarm: Option<String>,
        /// Template variable, repeatable: --var KEY=VALUE
        #[arg(long = "var")]
        vars: Vec<String>,
    },
    /// Remove a schedule entry by name.
    Remove { name: String },
    /// Start the scheduler daemon in the foreground.
    Start,
    /// Stop the running scheduler daemon.
    Stop,
    /// Report whether the scheduler daemon is running.
    Status,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let project_root = std::env::current_dir()?;

    match cli.command {
        Command::Init => command::init::run(&project_root),

        Command::Spawn { worktree, agent, prompt, prompt_file, base } => command::spawn::run(
            &project_root,
            &worktree,
            agent.as_deref(),
            prompt.as_deref(),
            prompt_file.as_ref(),
            base.as_deref(),
            cli.json,
        ),

        Command::Restart { agent_id } => command::restart::run(&project_root, &agent_id),

        Command::Kill { agent_id, all, worktree } => {
            command::kill::run(&project_root, agent_id.as_deref(), all, worktree.as_deref(), cli.json)
        }

        Command::Wait { agent_ids, timeout, poll } => command::wait::run(&project_root, &agent_ids, timeout, poll),

        Command::Status { watch } => command::status::run(&project_root, watch, cli.json),

        Command::Merge { worktree, into, squash, force } => {
            command::merge::run(&project_root, &worktree, into.as_deref(), squash, force)
        }

        Command::Clean { worktree, force } => command::clean::run(&project_root, &worktree, force),

        Command::Result { worktree, all, out } => {
            command::result::run(&project_root, worktree.as_deref(), all, out.as_deref(), cli.json)
        }

        Command::Schedule { action } => match action {
            ScheduleAction::List => command::schedule::list(&project_root, cli.json),
            ScheduleAction::Add { name, cron, prompt, swarm, vars } => {
                let parsed_vars: Result<Vec<(String, String)>> = vars.iter().map(|v| command::schedule::parse_var(v)).collect();
                command::schedule::add(&project_root, &name, &cron, prompt.as_deref(), swarm.as_deref(), &parsed_vars?)
            }
            ScheduleAction::Remove { name } => command::schedule::remove(&project_root, &name),
            ScheduleAction::Start => command::schedule::start(&project_root),
            ScheduleAction::Stop => command::schedule::stop(),
            ScheduleAction::Status => command::schedule::status(cli.json),
        },
    }
}
