use std::path::Path;

use anyhow::{Context, Result};

use crate::multiplexer::TmuxMultiplexer;
use crate::paths::Paths;
use crate::workflow;

pub fn run(project_root: &Path, worktree: &str, force: bool) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let mux = TmuxMultiplexer::new();
    workflow::clean(&paths, &mux, worktree, force).with_context(|| format!("Failed to clean worktree '{worktree}'"))?;
    println!("Cleaned worktree {worktree}");
    Ok(())
}
