use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tabled::Tabled;

use crate::command::render;
use crate::paths::Paths;
use crate::scheduler::{DaemonStatus, Invoke, ScheduleEntry};
use crate::workflow;

#[derive(Debug, Clone, Serialize, Tabled)]
struct EntryRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "CRON")]
    cron: String,
    #[tabled(rename = "INVOKE")]
    invoke: String,
}

fn invoke_label(invoke: &Invoke) -> String {
    match invoke {
        Invoke::Prompt(_) => "prompt".to_string(),
        Invoke::Swarm(name) => format!("swarm:{name}"),
    }
}

pub fn list(project_root: &Path, json: bool) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let entries = workflow::schedule_list(&paths)?;
    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow { name: e.name.clone(), cron: e.cron.clone(), invoke: invoke_label(&e.invoke) })
        .collect();
    render(json, &entries, || {
        let mut table = tabled::Table::new(rows.clone());
        table.with(tabled::settings::Style::rounded());
        println!("{table}");
    })
}

#[allow(clippy::too_many_arguments)]
pub fn add(
    project_root: &Path,
    name: &str,
    cron: &str,
    prompt: Option<&str>,
    swarm: Option<&str>,
    vars: &[(String, String)],
) -> Result<()> {
    let invoke = match (prompt, swarm) {
        (Some(text), None) => Invoke::Prompt(text.to_string()),
        (None, Some(template)) => Invoke::Swarm(template.to_string()),
        (None, None) => bail!("one of --prompt or --swarm is required"),
        (Some(_), Some(_)) => bail!("--prompt and --swarm are mutually exclusive"),
    };

    let paths = Paths::new(project_root.to_path_buf());
    let entry = ScheduleEntry {
        name: name.to_string(),
        cron: cron.to_string(),
        invoke,
        vars: vars.iter().cloned().collect::<BTreeMap<_, _>>(),
        project_path: project_root.to_path_buf(),
    };
    workflow::schedule_add(&paths, entry).with_context(|| format!("Failed to add schedule entry '{name}'"))?;
    println!("Added schedule entry {name}");
    Ok(())
}

pub fn remove(project_root: &Path, name: &str) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let removed = workflow::schedule_remove(&paths, name)?;
    if removed {
        println!("Removed schedule entry {name}");
    } else {
        println!("No schedule entry named {name}");
    }
    Ok(())
}

pub fn status(json: bool) -> Result<()> {
    let status = workflow::schedule_status()?;
    let (label, pid) = match status {
        DaemonStatus::Running(pid) => ("running", Some(pid)),
        DaemonStatus::Stopped => ("stopped", None),
    };
    #[derive(Serialize)]
    struct StatusBody {
        status: &'static str,
        pid: Option<i32>,
    }
    let body = StatusBody { status: label, pid };
    render(json, &body, || match pid {
        Some(pid) => println!("scheduler: running (pid {pid})"),
        None => println!("scheduler: stopped"),
    })
}

pub fn stop() -> Result<()> {
    let stopped = workflow::schedule_stop()?;
    if stopped {
        println!("Stopped scheduler");
    } else {
        println!("Scheduler was not running");
    }
    Ok(())
}

pub fn start(project_root: &Path) -> Result<()> {
    println!("Starting scheduler for {} (Ctrl-C to stop)", project_root.display());
    workflow::schedule_start(project_root)
}

pub fn parse_var(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw.split_once('=').with_context(|| format!("invalid --var '{raw}', expected KEY=VALUE"))?;
    Ok((key.to_string(), value.to_string()))
}
