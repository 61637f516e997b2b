//! Agent lifecycle and the signal-stack status detector (SPEC_FULL.md §4.6).
//!
//! This module knows how to launch a command in a pane and how to classify
//! an agent's current status from observable signals. It does not touch the
//! manifest directly -- `workflow.rs` wraps these calls in `manifest::update`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cmd::shell_quote;
use crate::config::AgentConfig;
use crate::manifest::types::{Agent, AgentStatus};
use crate::multiplexer::{Multiplexer, PaneInfo};

/// Shells the current-command heuristic checks for "agent exited to a prompt".
const SHELL_COMMANDS: &[&str] = &["sh", "bash", "zsh", "fish"];

/// Grace window after Ctrl-C before force-killing a pane.
pub const KILL_GRACE: Duration = Duration::from_secs(2);
pub const KILL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Grounds SPEC_FULL.md's open-question resolution: re-check the result file
/// exactly once, after a short sleep, before classifying a shell-prompt
/// transition as `failed`.
const SHELL_PROMPT_RECHECK_DELAY: Duration = Duration::from_millis(50);

/// Build the command line to send into a pane for a non-interactive agent:
/// `<command> <promptFlag> "<promptPath>"`. The path is double-quoted and
/// shell-escaped since it's typed into whatever shell is running in the pane
/// and worktree/project paths aren't guaranteed free of spaces or quotes.
/// Interactive agents are launched bare and driven via a follow-up `send` of
/// the prompt text.
pub fn non_interactive_command(agent_cfg: &AgentConfig, prompt_path: &Path) -> String {
    let flag = agent_cfg.prompt_flag.as_deref().unwrap_or("--prompt-file");
    let quoted_path = shell_quote(&prompt_path.display().to_string());
    format!("{} {} \"{}\"", agent_cfg.command, flag, quoted_path)
}

/// Launch `agent_cfg`'s command in `pane`. Non-interactive agents get the
/// prompt-file path baked into the command line; interactive agents are
/// started bare and then driven by a second literal send carrying the
/// prompt body, matching "the command expects to be driven by stdin".
pub fn launch(
    mux: &dyn Multiplexer,
    pane: &str,
    agent_cfg: &AgentConfig,
    prompt_path: &Path,
    rendered_prompt: &str,
) -> Result<()> {
    if agent_cfg.interactive {
        mux.send_literal(pane, &agent_cfg.command).context("Failed to launch agent command")?;
        mux.send_enter(pane)?;
        std::thread::sleep(Duration::from_millis(300));
        send(mux, pane, rendered_prompt)?;
    } else {
        let command = non_interactive_command(agent_cfg, prompt_path);
        mux.send_literal(pane, &command).context("Failed to launch agent command")?;
        mux.send_enter(pane)?;
    }
    Ok(())
}

/// Send further literal text, followed by Enter, to a running agent's pane.
pub fn send(mux: &dyn Multiplexer, pane: &str, text: &str) -> Result<()> {
    mux.send_literal(pane, text).context("Failed to send text to pane")?;
    mux.send_enter(pane)
}

/// Send Ctrl-C, wait up to `KILL_GRACE` polling every `KILL_POLL_INTERVAL`,
/// then force-kill the pane if it's still alive.
pub fn kill(mux: &dyn Multiplexer, pane: &str) -> Result<()> {
    mux.send_ctrl_c(pane)?;

    let deadline = std::time::Instant::now() + KILL_GRACE;
    loop {
        match mux.pane_info(pane)? {
            None => return Ok(()),
            Some(info) if info.dead => return Ok(()),
            Some(_) => {}
        }
        if std::time::Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(KILL_POLL_INTERVAL);
    }

    match mux.pane_info(pane)? {
        None => Ok(()),
        Some(_) => mux.kill_pane(pane).context("Failed to force-kill pane"),
    }
}

/// Kill every `targets` pane in parallel: Ctrl-C to all, wait once, then
/// force-kill whatever's still alive, also in parallel. The only sequential
/// part is the single bounded grace wait.
pub fn kill_all(mux: &(dyn Multiplexer + 'static), targets: Vec<String>) -> Vec<(String, Result<()>)>
where
{
    for target in &targets {
        let _ = mux.send_ctrl_c(target);
    }

    std::thread::sleep(KILL_GRACE);

    std::thread::scope(|scope| {
        let handles: Vec<_> = targets
            .into_iter()
            .map(|target| {
                scope.spawn(move || {
                    let result = match mux.pane_info(&target) {
                        Ok(None) => Ok(()),
                        Ok(Some(info)) if info.dead => Ok(()),
                        Ok(Some(_)) => mux.kill_pane(&target).context("Failed to force-kill pane"),
                        Err(e) => Err(e),
                    };
                    (target, result)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("kill worker panicked")).collect()
    })
}

fn is_shell_command(current_command: &str) -> bool {
    SHELL_COMMANDS.iter().any(|s| s.eq_ignore_ascii_case(current_command))
}

/// Evaluate the signal stack, first match wins:
/// 1. result file present -> `completed`
/// 2. pane gone -> `lost`
/// 3. pane dead -> `failed` (exit code = dead_status), unless already `killed`
/// 4. current command is a shell and the agent is interactive -> exited to a
///    prompt; re-check the result file once before classifying `failed`
/// 5. otherwise -> `running`
///
/// Only meaningful for agents not already in a terminal state; callers should
/// skip terminal agents before calling this.
pub fn detect_status(
    prior_status: AgentStatus,
    interactive: bool,
    pane: Option<&PaneInfo>,
    result_file_exists: bool,
    recheck_result_file: impl FnOnce() -> bool,
) -> (AgentStatus, Option<i32>) {
    if result_file_exists {
        return (AgentStatus::Completed, None);
    }

    let Some(pane) = pane else {
        return (AgentStatus::Lost, None);
    };

    if pane.dead {
        if prior_status == AgentStatus::Killed {
            return (AgentStatus::Killed, pane.dead_status);
        }
        return (AgentStatus::Failed, pane.dead_status);
    }

    if interactive && is_shell_command(&pane.current_command) {
        std::thread::sleep(SHELL_PROMPT_RECHECK_DELAY);
        return if recheck_result_file() {
            (AgentStatus::Completed, None)
        } else {
            (AgentStatus::Failed, None)
        };
    }

    (AgentStatus::Running, None)
}

/// Apply a freshly detected status/exit-code pair onto an in-memory `Agent`,
/// stamping `completedAt` when it transitions into a terminal state.
pub fn apply_status(agent: &mut Agent, status: AgentStatus, exit_code: Option<i32>) {
    if agent.status == status {
        return;
    }
    agent.status = status;
    agent.exit_code = exit_code.or(agent.exit_code);
    if status.is_terminal() {
        agent.completed_at.get_or_insert(chrono::Utc::now());
    }
}
