use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::git;
use crate::merge::MergeStrategy;
use crate::multiplexer::TmuxMultiplexer;
use crate::paths::Paths;
use crate::workflow;

pub fn run(project_root: &Path, worktree: &str, into: Option<&str>, squash: bool, force: bool) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let config = Config::load(&paths)?;
    let mux = TmuxMultiplexer::new();

    if let Some(target_branch) = into {
        git::checkout(project_root, target_branch)?;
    }

    let strategy = if squash { MergeStrategy::Squash } else { MergeStrategy::NoFf };
    workflow::merge_worktree(&paths, &config, &mux, project_root, worktree, strategy, force)
        .with_context(|| format!("Failed to merge worktree '{worktree}'"))?;

    println!("Merged worktree {worktree}");
    Ok(())
}
