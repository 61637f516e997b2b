//! Merge orchestrator (SPEC_FULL.md §4.7): multi-step worktree -> base-branch
//! merge with staged manifest-state transitions, owned by `workflow.rs`.
//! This module covers the git-level mechanics only.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cmd::Cmd;
use crate::error::PpgError;
use crate::git;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Squash,
    NoFf,
}

/// Merge `branch` into the current branch checked out at `project_root`.
/// Conflicts surface as `PpgError::MergeFailed` carrying git's stderr.
pub fn merge_branch(
    project_root: &Path,
    branch: &str,
    strategy: MergeStrategy,
    commit_message: &str,
) -> Result<()> {
    match strategy {
        MergeStrategy::Squash => {
            let output = Cmd::new("git")
                .workdir(project_root)
                .args(&["merge", "--squash", branch])
                .run();
            if let Err(e) = output {
                return Err(merge_failed(e));
            }
            git::commit(project_root, commit_message).context("Failed to commit squash merge")?;
        }
        MergeStrategy::NoFf => {
            let output = Cmd::new("git")
                .workdir(project_root)
                .args(&["merge", "--no-ff", "-m", commit_message, branch])
                .run();
            if let Err(e) = output {
                return Err(merge_failed(e));
            }
        }
    }
    Ok(())
}

fn merge_failed(source: anyhow::Error) -> anyhow::Error {
    PpgError::MergeFailed { stderr: source.to_string() }.into()
}

/// Commit message convention: `<prefix>: merge <name> (<branch>)`.
pub fn commit_message(prefix: &str, worktree_name: &str, branch: &str) -> String {
    format!("{prefix}: merge {worktree_name} ({branch})")
}
