use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::command::render;
use crate::config::Config;
use crate::manifest::Manifest;
use crate::multiplexer::TmuxMultiplexer;
use crate::paths::Paths;
use crate::workflow;

const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "WORKTREE")]
    worktree: String,
    #[tabled(rename = "BRANCH")]
    branch: String,
    #[tabled(rename = "AGENT")]
    agent_id: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PANE")]
    pane: String,
}

fn rows_from(manifest: &Manifest) -> Vec<StatusRow> {
    let mut worktrees: Vec<_> = manifest.worktrees.values().collect();
    worktrees.sort_by(|a, b| a.name.cmp(&b.name));

    let mut rows = Vec::new();
    for wt in worktrees {
        let mut agents: Vec<_> = wt.agents.values().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        for agent in agents {
            rows.push(StatusRow {
                worktree: wt.name.clone(),
                branch: wt.branch.clone(),
                agent_id: agent.id.clone(),
                status: format!("{:?}", agent.status).to_lowercase(),
                pane: agent.tmux_target.clone(),
            });
        }
    }
    rows
}

fn print_table(rows: &[StatusRow]) {
    let mut table = tabled::Table::new(rows.to_vec());
    table.with(tabled::settings::Style::rounded());
    println!("{table}");
}

pub fn run(project_root: &Path, watch: bool, json: bool) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let config = Config::load(&paths)?;
    let mux = TmuxMultiplexer::new();

    if !watch {
        let manifest = workflow::refresh_all(&paths, &config, &mux).context("Failed to refresh agent status")?;
        let rows = rows_from(&manifest);
        return render(json, &rows, || print_table(&rows));
    }

    loop {
        let manifest = workflow::refresh_all(&paths, &config, &mux).context("Failed to refresh agent status")?;
        let rows = rows_from(&manifest);
        if json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            print!("\x1b[2J\x1b[H");
            print_table(&rows);
        }
        std::thread::sleep(WATCH_INTERVAL);
    }
}
