mod agent;
mod cli;
mod cmd;
mod command;
mod config;
mod error;
mod git;
mod logger;
mod manifest;
mod merge;
mod multiplexer;
mod paths;
mod prompt;
mod result;
mod scheduler;
mod template;
mod workflow;
mod worktree;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    logger::init()?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "ppg start");

    match cli::run() {
        Ok(result) => {
            info!("ppg finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "ppg failed");
            Err(err)
        }
    }
}
