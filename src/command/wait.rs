use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::multiplexer::TmuxMultiplexer;
use crate::paths::Paths;
use crate::workflow;

const DEFAULT_TIMEOUT_SECS: u64 = 600;
const DEFAULT_POLL_SECS: u64 = 2;

pub fn run(project_root: &Path, agent_ids: &[String], timeout_secs: Option<u64>, poll_secs: Option<u64>) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let config = Config::load(&paths)?;
    let mux = TmuxMultiplexer::new();

    let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let poll_interval = Duration::from_secs(poll_secs.unwrap_or(DEFAULT_POLL_SECS));

    workflow::wait(&paths, &config, &mux, agent_ids, timeout, poll_interval)
        .with_context(|| format!("Failed waiting for agents: {}", agent_ids.join(", ")))?;

    println!("All agents reached a terminal state");
    Ok(())
}
