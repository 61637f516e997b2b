//! Result collection and aggregation (SPEC_FULL.md §4.9).
//!
//! Each agent writes (or is expected to write) a single Markdown file under
//! `.ppg/results/<agent-id>.md`. This module reads those files back and
//! assembles them into one deterministic document, falling back to a pane
//! tail for agents that never got to write a result.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::manifest::types::{AgentStatus, Manifest};
use crate::multiplexer::Multiplexer;
use crate::paths::Paths;

const PANE_TAIL_LINES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultSource {
    /// The agent's own result file.
    File,
    /// No result file; body is a tail of the agent's pane output instead.
    PaneTail,
    /// Neither a result file nor a capturable pane.
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub worktree_name: String,
    pub agent_id: String,
    pub agent_name: String,
    pub status: AgentStatus,
    pub body: String,
    pub source: ResultSource,
}

/// Collect results for every agent in `worktree_filter` (or every worktree if
/// `None`), sorted by worktree name then agent id. Agents that never produced
/// a result file fall back to a pane tail only when `mux` is given and the
/// agent's status warrants it (failed/killed/lost); panes for still-running
/// or already-merged/cleaned agents are left alone.
pub fn collect(
    manifest: &Manifest,
    paths: &Paths,
    worktree_filter: Option<&str>,
    mux: Option<&dyn Multiplexer>,
) -> Vec<AgentResult> {
    let mut worktrees: Vec<_> = manifest
        .worktrees
        .values()
        .filter(|wt| match worktree_filter {
            Some(name) => wt.name == name || wt.id == name,
            None => true,
        })
        .collect();
    worktrees.sort_by(|a, b| a.name.cmp(&b.name));

    let mut results = Vec::new();
    for wt in worktrees {
        let mut agents: Vec<_> = wt.agents.values().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));

        for agent in agents {
            let (body, source) = read_one(paths, agent.id.as_str(), agent.status, agent.tmux_target.as_str(), mux);
            results.push(AgentResult {
                worktree_name: wt.name.clone(),
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
                status: agent.status,
                body,
                source,
            });
        }
    }
    results
}

fn read_one(
    paths: &Paths,
    agent_id: &str,
    status: AgentStatus,
    tmux_target: &str,
    mux: Option<&dyn Multiplexer>,
) -> (String, ResultSource) {
    let result_path = paths.result_path(agent_id);
    if let Ok(contents) = fs::read_to_string(&result_path) {
        return (contents, ResultSource::File);
    }

    let wants_pane_tail = matches!(status, AgentStatus::Failed | AgentStatus::Killed | AgentStatus::Lost);
    if wants_pane_tail {
        if let Some(mux) = mux {
            if let Ok(tail) = mux.capture_pane(tmux_target, Some(PANE_TAIL_LINES)) {
                return (tail, ResultSource::PaneTail);
            }
        }
    }

    (String::new(), ResultSource::Missing)
}

/// Render a sequence of results into one Markdown document, each agent
/// under its own `##` section, worktree-then-agent ordered.
pub fn render_markdown(results: &[AgentResult]) -> String {
    let mut out = String::new();
    for result in results {
        out.push_str(&format!(
            "## {} / {} ({})\n\n",
            result.worktree_name,
            result.agent_id,
            status_label(result.status)
        ));
        match result.source {
            ResultSource::Missing => out.push_str("_no result file and no pane output available_\n"),
            ResultSource::PaneTail => {
                out.push_str(&format!("_no result file; showing last {PANE_TAIL_LINES} lines of pane output_\n\n"));
                out.push_str("```\n");
                out.push_str(result.body.trim_end());
                out.push_str("\n```\n");
            }
            ResultSource::File => out.push_str(result.body.trim_end()),
        }
        out.push_str("\n\n---\n\n");
    }
    if out.ends_with("---\n\n") {
        out.truncate(out.len() - "---\n\n".len());
    }
    out
}

fn status_label(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Spawning => "spawning",
        AgentStatus::Running => "running",
        AgentStatus::Completed => "completed",
        AgentStatus::Failed => "failed",
        AgentStatus::Killed => "killed",
        AgentStatus::Lost => "lost",
    }
}

/// Write the rendered document to `out_path`, or return it for the caller to
/// print to stdout when `out_path` is `None`.
pub fn write_or_return(rendered: String, out_path: Option<&Path>) -> Result<Option<String>> {
    match out_path {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(None)
        }
        None => Ok(Some(rendered)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use crate::manifest::types::{Agent, Worktree};

    fn agent(id: &str, status: AgentStatus) -> Agent {
        Agent {
            id: id.into(),
            name: "claude".into(),
            agent_type: "claude".into(),
            status,
            tmux_target: "%1".into(),
            prompt: "do it".into(),
            result_file: PathBuf::from("/tmp/r.md"),
            started_at: Utc::now(),
            completed_at: None,
            exit_code: None,
            error: None,
        }
    }

    fn worktree(name: &str, agents: Vec<Agent>) -> Worktree {
        Worktree {
            id: format!("wt-{name}"),
            name: name.into(),
            path: PathBuf::from(format!("/tmp/proj/.worktrees/wt-{name}")),
            branch: format!("ppg/{name}"),
            base_branch: "main".into(),
            status: crate::manifest::types::WorktreeStatus::Active,
            tmux_window: "ppg:1".into(),
            agents: agents.into_iter().map(|a| (a.id.clone(), a)).collect(),
            created_at: Utc::now(),
            merged_at: None,
        }
    }

    #[test]
    fn collect_reads_result_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().to_path_buf());
        fs::create_dir_all(paths.results_dir()).unwrap();
        fs::write(paths.result_path("ag-1"), "done well").unwrap();

        let mut manifest = Manifest::new(dir.path().to_path_buf(), "ppg-proj".into());
        let wt = worktree("task-a", vec![agent("ag-1", AgentStatus::Completed)]);
        manifest.worktrees.insert(wt.id.clone(), wt);

        let results = collect(&manifest, &paths, None, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, ResultSource::File);
        assert_eq!(results[0].body, "done well");
    }

    #[test]
    fn collect_marks_missing_when_no_file_and_no_mux() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().to_path_buf());
        fs::create_dir_all(paths.results_dir()).unwrap();

        let mut manifest = Manifest::new(dir.path().to_path_buf(), "ppg-proj".into());
        let wt = worktree("task-a", vec![agent("ag-1", AgentStatus::Failed)]);
        manifest.worktrees.insert(wt.id.clone(), wt);

        let results = collect(&manifest, &paths, None, None);
        assert_eq!(results[0].source, ResultSource::Missing);
    }

    #[test]
    fn collect_sorts_by_worktree_then_agent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().to_path_buf());
        fs::create_dir_all(paths.results_dir()).unwrap();

        let mut manifest = Manifest::new(dir.path().to_path_buf(), "ppg-proj".into());
        let wt_b = worktree("bbb", vec![agent("ag-2", AgentStatus::Completed), agent("ag-1", AgentStatus::Completed)]);
        let wt_a = worktree("aaa", vec![agent("ag-3", AgentStatus::Completed)]);
        manifest.worktrees.insert(wt_b.id.clone(), wt_b);
        manifest.worktrees.insert(wt_a.id.clone(), wt_a);

        let results = collect(&manifest, &paths, None, None);
        let order: Vec<_> = results.iter().map(|r| (r.worktree_name.as_str(), r.agent_id.as_str())).collect();
        assert_eq!(order, vec![("aaa", "ag-3"), ("bbb", "ag-1"), ("bbb", "ag-2")]);
    }

    #[test]
    fn render_markdown_includes_section_headers_and_delimiters() {
        let results = vec![AgentResult {
            worktree_name: "task-a".into(),
            agent_id: "ag-1".into(),
            agent_name: "claude".into(),
            status: AgentStatus::Completed,
            body: "all good".into(),
            source: ResultSource::File,
        }];
        let rendered = render_markdown(&results);
        assert!(rendered.contains("## task-a / ag-1 (completed)"));
        assert!(rendered.contains("all good"));
    }
}
