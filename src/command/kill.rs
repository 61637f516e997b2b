use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tabled::Tabled;

use crate::command::render;
use crate::multiplexer::TmuxMultiplexer;
use crate::paths::Paths;
use crate::workflow;

#[derive(Debug, Clone, Serialize, Tabled)]
struct KillRow {
    #[tabled(rename = "AGENT")]
    agent_id: String,
    #[tabled(rename = "RESULT")]
    result: String,
}

pub fn run(project_root: &Path, agent_id: Option<&str>, all: bool, worktree: Option<&str>, json: bool) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let mux = TmuxMultiplexer::new();

    match (agent_id, all) {
        (Some(id), false) => {
            workflow::kill(&paths, &mux, id).with_context(|| format!("Failed to kill agent '{id}'"))?;
            render(json, &vec![KillRow { agent_id: id.to_string(), result: "killed".to_string() }], || {
                println!("Killed agent {id}");
            })
        }
        (None, true) => {
            let outcomes = workflow::kill_all(&paths, &mux, worktree)?;
            let rows: Vec<KillRow> = outcomes
                .iter()
                .map(|(id, result)| KillRow {
                    agent_id: id.clone(),
                    result: match result {
                        Ok(()) => "killed".to_string(),
                        Err(e) => format!("error: {e}"),
                    },
                })
                .collect();
            render(json, &rows, || {
                let mut table = tabled::Table::new(rows.clone());
                table.with(tabled::settings::Style::rounded());
                println!("{table}");
            })
        }
        (Some(_), true) => bail!("pass either an agent id or --all, not both"),
        (None, false) => bail!("pass an agent id or --all"),
    }
}
