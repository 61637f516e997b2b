//! Thin wrapper around the `git` CLI for everything the worktree manager and
//! merge orchestrator need: worktree lifecycle, branch bookkeeping, and diff
//! stats.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::cmd::Cmd;

/// Thrown when a branch has no worktree registered for it.
#[derive(Debug, thiserror::Error)]
#[error("Worktree not found for branch: {0}")]
pub struct WorktreeNotFound(pub String);

pub fn is_git_repo() -> Result<bool> {
    Cmd::new("git")
        .args(&["rev-parse", "--is-inside-work-tree"])
        .run_as_check()
}

pub fn get_repo_root() -> Result<PathBuf> {
    let output = Cmd::new("git")
        .args(&["rev-parse", "--show-toplevel"])
        .run_and_capture_stdout()
        .context("Failed to determine repo root")?;
    Ok(PathBuf::from(output))
}

pub fn get_current_branch() -> Result<String> {
    Cmd::new("git")
        .args(&["branch", "--show-current"])
        .run_and_capture_stdout()
}

/// Check out `branch` in the repo at `project_root`. Used by `merge --into`
/// to point the merge at a branch other than whatever is currently checked out.
pub fn checkout(project_root: &Path, branch: &str) -> Result<()> {
    Cmd::new("git")
        .workdir(project_root)
        .args(&["checkout", branch])
        .run()
        .with_context(|| format!("Failed to check out '{branch}'"))?;
    Ok(())
}

pub fn branch_exists(branch_name: &str) -> Result<bool> {
    Cmd::new("git")
        .args(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch_name}")])
        .run_as_check()
}

/// Create a new git worktree, optionally creating its branch from `base`.
pub fn create_worktree(worktree_path: &Path, branch_name: &str, create_branch: bool, base: Option<&str>) -> Result<()> {
    let path_str = worktree_path
        .to_str()
        .ok_or_else(|| anyhow!("Invalid worktree path"))?;

    let mut cmd = Cmd::new("git").arg("worktree").arg("add");
    if create_branch {
        cmd = cmd.arg("-b").arg(branch_name).arg(path_str);
        if let Some(base) = base {
            cmd = cmd.arg(base);
        }
    } else {
        cmd = cmd.arg(path_str).arg(branch_name);
    }

    cmd.run().context("Failed to create worktree")?;
    Ok(())
}

fn parse_worktree_list_porcelain(output: &str) -> Vec<(PathBuf, String)> {
    let mut worktrees = Vec::new();
    for block in output.trim().split("\n\n") {
        let mut path: Option<PathBuf> = None;
        let mut branch: Option<String> = None;
        for line in block.lines() {
            if let Some(p) = line.strip_prefix("worktree ") {
                path = Some(PathBuf::from(p));
            } else if let Some(b) = line.strip_prefix("branch refs/heads/") {
                branch = Some(b.to_string());
            } else if line.trim() == "detached" {
                branch = Some("(detached)".to_string());
            }
        }
        if let (Some(p), Some(b)) = (path, branch) {
            worktrees.push((p, b));
        }
    }
    worktrees
}

pub fn list_worktrees() -> Result<Vec<(PathBuf, String)>> {
    let output = Cmd::new("git")
        .args(&["worktree", "list", "--porcelain"])
        .run_and_capture_stdout()
        .context("Failed to list worktrees")?;
    Ok(parse_worktree_list_porcelain(&output))
}

pub fn get_worktree_path(branch_name: &str) -> Result<PathBuf> {
    list_worktrees()?
        .into_iter()
        .find(|(_, branch)| branch == branch_name)
        .map(|(path, _)| path)
        .ok_or_else(|| WorktreeNotFound(branch_name.to_string()).into())
}

pub fn worktree_exists(branch_name: &str) -> Result<bool> {
    match get_worktree_path(branch_name) {
        Ok(_) => Ok(true),
        Err(e) if e.is::<WorktreeNotFound>() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove a worktree checkout. `--force` discards any uncommitted changes in it.
pub fn remove_worktree(worktree_path: &Path) -> Result<()> {
    let path_str = worktree_path
        .to_str()
        .ok_or_else(|| anyhow!("Invalid worktree path"))?;
    Cmd::new("git")
        .args(&["worktree", "remove", "--force", path_str])
        .run()
        .context("Failed to remove worktree")?;
    Ok(())
}

pub fn delete_branch(branch_name: &str, force: bool) -> Result<()> {
    let flag = if force { "-D" } else { "-d" };
    Cmd::new("git")
        .args(&["branch", flag, branch_name])
        .run()
        .context("Failed to delete branch")?;
    Ok(())
}

pub fn has_uncommitted_changes(worktree_path: &Path) -> Result<bool> {
    let output = Cmd::new("git")
        .workdir(worktree_path)
        .args(&["status", "--porcelain"])
        .run_and_capture_stdout()
        .context("Failed to check git status")?;
    Ok(!output.trim().is_empty())
}

/// Merge `branch` into the current branch of the repo at `project_root`,
/// using a merge commit (`--no-ff`).
pub fn merge_no_ff(project_root: &Path, branch: &str, message: &str) -> Result<()> {
    Cmd::new("git")
        .workdir(project_root)
        .args(&["merge", "--no-ff", "-m", message, branch])
        .run()
        .context("Failed to merge")?;
    Ok(())
}

/// Stage `branch`'s changes via a squash merge (does not commit).
pub fn merge_squash(project_root: &Path, branch: &str) -> Result<()> {
    Cmd::new("git")
        .workdir(project_root)
        .args(&["merge", "--squash", branch])
        .run()
        .context("Failed to perform squash merge")?;
    Ok(())
}

pub fn commit(project_root: &Path, message: &str) -> Result<()> {
    Cmd::new("git")
        .workdir(project_root)
        .args(&["commit", "-m", message])
        .run()
        .context("Failed to commit")?;
    Ok(())
}

pub fn reset_hard(project_root: &Path) -> Result<()> {
    Cmd::new("git")
        .workdir(project_root)
        .args(&["reset", "--hard", "HEAD"])
        .run()
        .context("Failed to reset")?;
    Ok(())
}

pub fn abort_merge(project_root: &Path) -> Result<()> {
    Cmd::new("git")
        .workdir(project_root)
        .args(&["merge", "--abort"])
        .run()
        .context("Failed to abort merge")?;
    Ok(())
}

/// Store the base branch a branch was created from, under a dedicated git
/// config section (not `branch.*`, which is deleted along with the branch).
pub fn set_branch_base(branch: &str, base: &str) -> Result<()> {
    Cmd::new("git")
        .args(&["config", "--local", &format!("ppg.base.{branch}"), base])
        .run()
        .context("Failed to store base branch")?;
    Ok(())
}

pub fn get_branch_base(branch: &str) -> Result<String> {
    let output = Cmd::new("git")
        .args(&["config", "--local", &format!("ppg.base.{branch}")])
        .run_and_capture_stdout()
        .context("Failed to read stored base branch")?;
    if output.is_empty() {
        return Err(anyhow!("No base branch stored for '{branch}'"));
    }
    Ok(output)
}

pub fn unset_branch_base(branch: &str) -> Result<()> {
    let _ = Cmd::new("git")
        .args(&["config", "--local", "--unset", &format!("ppg.base.{branch}")])
        .run();
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

/// `git diff --stat` between `base` and `branch`, summarized.
pub fn diff_stat(project_root: &Path, base: &str, branch: &str) -> Result<DiffStats> {
    let output = Cmd::new("git")
        .workdir(project_root)
        .args(&["diff", "--numstat", &format!("{base}...{branch}")])
        .run_and_capture_stdout()
        .context("Failed to compute diff stat")?;

    let mut stats = DiffStats::default();
    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let added = parts.next().unwrap_or("0");
        let removed = parts.next().unwrap_or("0");
        stats.files_changed += 1;
        stats.insertions += added.parse::<usize>().unwrap_or(0);
        stats.deletions += removed.parse::<usize>().unwrap_or(0);
    }
    Ok(stats)
}

/// `git diff --name-only` between `base` and `branch`.
pub fn diff_name_only(project_root: &Path, base: &str, branch: &str) -> Result<Vec<String>> {
    let output = Cmd::new("git")
        .workdir(project_root)
        .args(&["diff", "--name-only", &format!("{base}...{branch}")])
        .run_and_capture_stdout()
        .context("Failed to list changed files")?;
    Ok(output.lines().map(String::from).collect())
}

/// Branches not yet merged into `base`.
pub fn get_unmerged_branches(base: &str) -> Result<HashSet<String>> {
    let arg = format!("--no-merged={base}");
    match Cmd::new("git")
        .args(&["for-each-ref", "--format=%(refname:short)", &arg, "refs/heads/"])
        .run_and_capture_stdout()
    {
        Ok(output) => Ok(output.lines().map(String::from).collect()),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("malformed object name") || msg.contains("unknown commit") {
                Ok(HashSet::new())
            } else {
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_porcelain_worktree_list() {
        let output = "worktree /repo\nHEAD abc123\nbranch refs/heads/main\n\n\
worktree /repo/.worktrees/wt-abc123\nHEAD def456\nbranch refs/heads/ppg/t1\n";
        let parsed = parse_worktree_list_porcelain(output);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].1, "ppg/t1");
    }

    #[test]
    fn parses_detached_worktree() {
        let output = "worktree /repo\nHEAD abc123\ndetached\n";
        let parsed = parse_worktree_list_porcelain(output);
        assert_eq!(parsed[0].1, "(detached)");
    }
}
