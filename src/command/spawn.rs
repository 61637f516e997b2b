use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tabled::Tabled;

use crate::command::render;
use crate::config::Config;
use crate::multiplexer::TmuxMultiplexer;
use crate::paths::Paths;
use crate::prompt::Prompt;
use crate::workflow::{self, SpawnRequest};

#[derive(Debug, Clone, Serialize, Tabled)]
struct SpawnRow {
    #[tabled(rename = "WORKTREE")]
    worktree_id: String,
    #[tabled(rename = "AGENT")]
    agent_id: String,
    #[tabled(rename = "PANE")]
    pane: String,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    project_root: &Path,
    worktree: &str,
    agent: Option<&str>,
    prompt: Option<&str>,
    prompt_file: Option<&PathBuf>,
    base: Option<&str>,
    json: bool,
) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let config = Config::load(&paths)?;
    let mux = TmuxMultiplexer::new();

    let prompt = match (prompt, prompt_file) {
        (Some(text), None) => Prompt::Inline(text.to_string()),
        (None, Some(path)) => Prompt::FromFile(path.clone()),
        (None, None) => bail!("one of --prompt or --prompt-file is required"),
        (Some(_), Some(_)) => bail!("--prompt and --prompt-file are mutually exclusive"),
    };

    let outcome = workflow::spawn(
        &paths,
        &config,
        &mux,
        project_root,
        SpawnRequest { worktree_name: worktree, agent_key: agent, prompt, base },
    )
    .with_context(|| format!("Failed to spawn agent in worktree '{worktree}'"))?;

    let row = SpawnRow { worktree_id: outcome.worktree_id, agent_id: outcome.agent_id, pane: outcome.pane };
    render(json, &row, || {
        let mut table = tabled::Table::new([row.clone()]);
        table.with(tabled::settings::Style::rounded());
        println!("{table}");
    })
}
