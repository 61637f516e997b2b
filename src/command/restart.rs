use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::multiplexer::TmuxMultiplexer;
use crate::paths::Paths;
use crate::workflow;

pub fn run(project_root: &Path, agent_id: &str) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let config = Config::load(&paths)?;
    let mux = TmuxMultiplexer::new();

    workflow::restart(&paths, &config, &mux, agent_id).with_context(|| format!("Failed to restart agent '{agent_id}'"))?;
    println!("Restarted agent {agent_id}");
    Ok(())
}
