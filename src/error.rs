//! The stable error taxonomy for the orchestration core.
//!
//! Most functions return `anyhow::Result` and attach context at the call
//! site; callers that need to branch on a specific failure (the CLI's
//! exit-code mapping, merge's `AGENTS_RUNNING` retry prompt) downcast with
//! `err.downcast_ref::<PpgError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PpgError {
    #[error("tmux was not found on PATH")]
    TmuxNotFound,

    #[error("gh was not found on PATH")]
    GhNotFound,

    #[error("not a git repository")]
    NotGitRepo,

    #[error("project is not initialized (run `ppg init` first)")]
    NotInitialized,

    #[error("could not acquire the manifest lock after retrying")]
    ManifestLock,

    #[error("worktree not found: {0}")]
    WorktreeNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("pane not found: {0}")]
    PaneNotFound(String),

    #[error("no tmux window for worktree: {0}")]
    NoTmuxWindow(String),

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("no tmux session id available")]
    NoSessionId,

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("agents are still running; pass --force to proceed anyway")]
    AgentsRunning,

    #[error("worktree has unmerged work: {0}")]
    UnmergedWork(String),

    #[error("merge failed due to conflicts:\n{stderr}")]
    MergeFailed { stderr: String },

    #[error("timed out after {secs}s waiting for agents to finish")]
    WaitTimeout { secs: u64 },

    #[error("one or more agents failed")]
    AgentsFailed,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("install failed: {0}")]
    InstallFailed(String),
}

impl PpgError {
    /// The stable machine-readable code for this error, as named in the
    /// error taxonomy (used by the CLI's `{error: {code, message}}` JSON
    /// output and for mapping to process exit codes).
    pub fn code(&self) -> &'static str {
        match self {
            PpgError::TmuxNotFound => "TMUX_NOT_FOUND",
            PpgError::GhNotFound => "GH_NOT_FOUND",
            PpgError::NotGitRepo => "NOT_GIT_REPO",
            PpgError::NotInitialized => "NOT_INITIALIZED",
            PpgError::ManifestLock => "MANIFEST_LOCK",
            PpgError::WorktreeNotFound(_) => "WORKTREE_NOT_FOUND",
            PpgError::AgentNotFound(_) => "AGENT_NOT_FOUND",
            PpgError::PaneNotFound(_) => "PANE_NOT_FOUND",
            PpgError::NoTmuxWindow(_) => "NO_TMUX_WINDOW",
            PpgError::TargetNotFound(_) => "TARGET_NOT_FOUND",
            PpgError::NoSessionId => "NO_SESSION_ID",
            PpgError::InvalidArgs(_) => "INVALID_ARGS",
            PpgError::AgentsRunning => "AGENTS_RUNNING",
            PpgError::UnmergedWork(_) => "UNMERGED_WORK",
            PpgError::MergeFailed { .. } => "MERGE_FAILED",
            PpgError::WaitTimeout { .. } => "WAIT_TIMEOUT",
            PpgError::AgentsFailed => "AGENTS_FAILED",
            PpgError::DownloadFailed(_) => "DOWNLOAD_FAILED",
            PpgError::InstallFailed(_) => "INSTALL_FAILED",
        }
    }
}
