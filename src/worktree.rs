//! Worktree manager (SPEC_FULL.md §4.4): creation, environment provisioning,
//! teardown, removal, and diffing.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::git;

/// Create a git worktree at `path` on a new branch `branch`, optionally from
/// `base`, then provision its environment (env file copies, node_modules
/// symlink). The base branch is recorded in git config so merge can
/// auto-detect the target later.
pub fn create(config: &Config, project_root: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
    if git::branch_exists(branch)? {
        anyhow::bail!("Branch '{branch}' already exists");
    }
    if path.exists() {
        anyhow::bail!("Worktree path already exists: {}", path.display());
    }

    git::create_worktree(path, branch, true, Some(base)).with_context(|| format!("Failed to create worktree for branch '{branch}'"))?;
    git::set_branch_base(branch, base)?;

    provision_env(config, project_root, path)?;
    if config.symlink_node_modules() {
        symlink_node_modules(project_root, path)?;
    }

    Ok(())
}

/// Copy every configured env file into the new worktree, in parallel.
/// Missing source files are tolerated (best-effort).
fn provision_env(config: &Config, project_root: &Path, worktree_path: &Path) -> Result<()> {
    let handles: Vec<_> = config
        .env_files
        .iter()
        .cloned()
        .map(|rel| {
            let src = project_root.join(&rel);
            let dst = worktree_path.join(&rel);
            thread::spawn(move || -> Result<()> {
                if !src.exists() {
                    return Ok(());
                }
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&src, &dst).with_context(|| format!("Failed to copy env file {}", src.display()))?;
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "worktree:env-copy failed"),
            Err(_) => tracing::warn!("worktree:env-copy thread panicked"),
        }
    }
    Ok(())
}

fn symlink_node_modules(project_root: &Path, worktree_path: &Path) -> Result<()> {
    let src = project_root.join("node_modules");
    if !src.exists() {
        return Ok(());
    }
    let dst = worktree_path.join("node_modules");

    #[cfg(unix)]
    std::os::unix::fs::symlink(&src, &dst).with_context(|| format!("Failed to symlink node_modules into {}", dst.display()))?;
    #[cfg(not(unix))]
    std::os::windows::fs::symlink_dir(&src, &dst).with_context(|| format!("Failed to symlink node_modules into {}", dst.display()))?;

    Ok(())
}

/// Remove the node_modules symlink if present, remove the worktree checkout,
/// and delete its branch. Best-effort: individual failures are logged and the
/// first fatal one is returned, matching "teardown is best-effort per step".
pub fn teardown(path: &Path, branch: &str) -> Result<()> {
    let node_modules = path.join("node_modules");
    if node_modules.symlink_metadata().is_ok() {
        if let Err(e) = fs::remove_file(&node_modules) {
            tracing::warn!(error = %e, path = %node_modules.display(), "worktree:teardown symlink removal failed");
        }
    }

    let mut first_fatal: Option<anyhow::Error> = None;

    if path.exists() {
        if let Err(e) = git::remove_worktree(path) {
            tracing::warn!(error = %e, "worktree:teardown git worktree remove failed");
            first_fatal.get_or_insert(e);
        }
    }

    if let Err(e) = git::delete_branch(branch, true) {
        tracing::warn!(error = %e, branch, "worktree:teardown branch delete failed");
        first_fatal.get_or_insert(e);
    }

    let _ = git::unset_branch_base(branch);

    match first_fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct DiffSummary {
    pub stat: git::DiffStats,
    pub files: Vec<String>,
}

pub fn diff(project_root: &Path, base: &str, branch: &str) -> Result<DiffSummary> {
    Ok(DiffSummary {
        stat: git::diff_stat(project_root, base, branch)?,
        files: git::diff_name_only(project_root, base, branch)?,
    })
}

/// Default sibling directory for worktree checkouts, honoring `config.worktreeBase`.
pub fn worktrees_root(project_root: &Path, config: &Config) -> PathBuf {
    match &config.worktree_base {
        Some(custom) => {
            let p = PathBuf::from(custom);
            if p.is_absolute() { p } else { project_root.join(p) }
        }
        None => project_root.join(crate::paths::WORKTREES_DIR_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worktrees_root_defaults_to_sibling_dir() {
        let config = Config::default();
        let root = worktrees_root(Path::new("/tmp/proj"), &config);
        assert_eq!(root, Path::new("/tmp/proj/.worktrees"));
    }

    #[test]
    fn worktrees_root_honors_absolute_override() {
        let mut config = Config::default();
        config.worktree_base = Some("/var/wt".to_string());
        let root = worktrees_root(Path::new("/tmp/proj"), &config);
        assert_eq!(root, Path::new("/var/wt"));
    }

    #[test]
    fn worktrees_root_honors_relative_override() {
        let mut config = Config::default();
        config.worktree_base = Some("wt-dir".to_string());
        let root = worktrees_root(Path::new("/tmp/proj"), &config);
        assert_eq!(root, Path::new("/tmp/proj/wt-dir"));
    }
}
