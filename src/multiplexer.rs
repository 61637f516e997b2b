//! The terminal multiplexer adapter (see SPEC_FULL.md §4.5).
//!
//! One session per project, one window per worktree, one pane per agent.
//! tmux is the only backend implemented, but the lifecycle/status code and
//! the CLI depend on the `Multiplexer` trait, not on tmux directly, so the
//! subprocess-shelling stays concentrated in this one file and is testable
//! against a fake.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::cmd::Cmd;

/// One row of `tmux list-panes` output, scoped to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub pane_id: String,
    pub pane_pid: u32,
    pub current_command: String,
    pub dead: bool,
    pub dead_status: Option<i32>,
    pub window_index: u32,
}

/// Session/window/pane lifecycle, send-keys, introspection, capture, resize.
///
/// Object-safe and `Send + Sync` so it can be shared across the threads that
/// fan out subprocess calls during a parallel kill or refresh.
pub trait Multiplexer: Send + Sync {
    /// Idempotent: create the session if absent, tolerate it already existing.
    fn ensure_session(&self, session: &str, cwd: &Path) -> Result<()>;

    /// Create a window in `session` rooted at `cwd`; returns the window's
    /// initial pane id (the multiplexer prints it on creation).
    fn create_window(&self, session: &str, name: &str, cwd: &Path) -> Result<String>;

    /// Split `target` pane, returning the new pane's id.
    fn split_pane(&self, target: &str, cwd: &Path) -> Result<String>;

    /// Send literal text (no key interpretation) to `target`.
    fn send_literal(&self, target: &str, text: &str) -> Result<()>;

    fn send_enter(&self, target: &str) -> Result<()>;

    fn send_ctrl_c(&self, target: &str) -> Result<()>;

    /// List every pane in `session`.
    fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>>;

    /// Info for a single pane; `Ok(None)` if it no longer exists.
    fn pane_info(&self, target: &str) -> Result<Option<PaneInfo>>;

    /// Capture the last `lines` lines of scrollback (or full history if `None`).
    fn capture_pane(&self, target: &str, lines: Option<u32>) -> Result<String>;

    fn resize_pane(&self, target: &str, cols: u16, rows: u16) -> Result<()>;

    fn kill_window(&self, target: &str) -> Result<()>;

    fn kill_pane(&self, target: &str) -> Result<()>;
}

/// The tmux backend. Stateless -- every call shells out.
#[derive(Debug, Default)]
pub struct TmuxMultiplexer;

impl TmuxMultiplexer {
    pub fn new() -> Self {
        Self
    }

    fn tmux(&self, args: &[&str]) -> Result<()> {
        Cmd::new("tmux").args(args).run().with_context(|| format!("tmux {args:?} failed"))?;
        Ok(())
    }

    fn tmux_query(&self, args: &[&str]) -> Result<String> {
        Cmd::new("tmux").args(args).run_and_capture_stdout().with_context(|| format!("tmux {args:?} failed"))
    }
}

/// tmux interprets a leading `-` in `send-keys -l <text>` as an additional
/// flag rather than literal content; insert `--` to neutralize it.
fn literal_args<'a>(target: &'a str, text: &'a str) -> Vec<&'a str> {
    if text.starts_with('-') {
        vec!["send-keys", "-t", target, "-l", "--", text]
    } else {
        vec!["send-keys", "-t", target, "-l", text]
    }
}

fn parse_pane_list(output: &str) -> Vec<PaneInfo> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 6 {
                return None;
            }
            let dead_status = parts[3].parse::<i32>().ok().filter(|_| parts[2] == "1");
            Some(PaneInfo {
                pane_id: parts[0].to_string(),
                pane_pid: parts[1].parse().unwrap_or(0),
                current_command: parts[4].to_string(),
                dead: parts[2] == "1",
                dead_status,
                window_index: parts[5].parse().unwrap_or(0),
            })
        })
        .collect()
}

const PANE_LIST_FORMAT: &str =
    "#{pane_id}\t#{pane_pid}\t#{pane_dead}\t#{pane_dead_status}\t#{pane_current_command}\t#{window_index}";

impl Multiplexer for TmuxMultiplexer {
    fn ensure_session(&self, session: &str, cwd: &Path) -> Result<()> {
        let has_session = Cmd::new("tmux").args(&["has-session", "-t", session]).run_as_check()?;
        if has_session {
            return Ok(());
        }
        let cwd_str = cwd.to_str().ok_or_else(|| anyhow!("non-UTF8 cwd"))?;
        self.tmux(&["new-session", "-d", "-s", session, "-c", cwd_str])
    }

    fn create_window(&self, session: &str, name: &str, cwd: &Path) -> Result<String> {
        let cwd_str = cwd.to_str().ok_or_else(|| anyhow!("non-UTF8 cwd"))?;
        let target = format!("{session}:");
        self.tmux_query(&["new-window", "-d", "-t", &target, "-n", name, "-c", cwd_str, "-P", "-F", "#{pane_id}"])
            .map(|s| s.trim().to_string())
    }

    fn split_pane(&self, target: &str, cwd: &Path) -> Result<String> {
        let cwd_str = cwd.to_str().ok_or_else(|| anyhow!("non-UTF8 cwd"))?;
        self.tmux_query(&["split-window", "-t", target, "-c", cwd_str, "-P", "-F", "#{pane_id}"])
            .map(|s| s.trim().to_string())
    }

    fn send_literal(&self, target: &str, text: &str) -> Result<()> {
        self.tmux(&literal_args(target, text))
    }

    fn send_enter(&self, target: &str) -> Result<()> {
        self.tmux(&["send-keys", "-t", target, "Enter"])
    }

    fn send_ctrl_c(&self, target: &str) -> Result<()> {
        self.tmux(&["send-keys", "-t", target, "C-c"])
    }

    fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>> {
        let output = self.tmux_query(&["list-panes", "-s", "-t", session, "-F", PANE_LIST_FORMAT])?;
        Ok(parse_pane_list(&output))
    }

    fn pane_info(&self, target: &str) -> Result<Option<PaneInfo>> {
        match self.tmux_query(&["display-message", "-p", "-t", target, PANE_LIST_FORMAT]) {
            Ok(output) => Ok(parse_pane_list(output.trim()).into_iter().next()),
            Err(_) => Ok(None),
        }
    }

    fn capture_pane(&self, target: &str, lines: Option<u32>) -> Result<String> {
        match lines {
            Some(n) => {
                let start = format!("-{n}");
                self.tmux_query(&["capture-pane", "-p", "-t", target, "-S", &start])
            }
            None => self.tmux_query(&["capture-pane", "-p", "-t", target, "-S", "-"]),
        }
    }

    fn resize_pane(&self, target: &str, cols: u16, rows: u16) -> Result<()> {
        self.tmux(&["resize-pane", "-t", target, "-x", &cols.to_string(), "-y", &rows.to_string()])
    }

    fn kill_window(&self, target: &str) -> Result<()> {
        self.tmux(&["kill-window", "-t", target])
    }

    fn kill_pane(&self, target: &str) -> Result<()> {
        self.tmux(&["kill-pane", "-t", target])
    }
}

/// Poll `pane_info` at `interval` until the pane is gone or dead, or `timeout`
/// elapses. Returns the last observed info (`None` if the pane vanished).
pub fn wait_pane_inactive(
    mux: &dyn Multiplexer,
    target: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<Option<PaneInfo>> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let info = mux.pane_info(target)?;
        match &info {
            None => return Ok(None),
            Some(p) if p.dead => return Ok(info),
            Some(_) => {}
        }
        if std::time::Instant::now() >= deadline {
            return Ok(info);
        }
        std::thread::sleep(interval);
    }
}
