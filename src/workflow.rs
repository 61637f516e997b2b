//! Core orchestration workflows (SPEC_FULL.md §4): the only module that
//! composes the manifest store with worktrees, agents, panes, merges,
//! results, and the scheduler into the operations the CLI exposes. The CLI
//! layer calls exactly one of these per subcommand and renders the result.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::agent;
use crate::config::Config;
use crate::error::PpgError;
use crate::git;
use crate::manifest::{self, Agent, AgentStatus, Manifest, Worktree, WorktreeStatus};
use crate::merge::{self, MergeStrategy};
use crate::multiplexer::{Multiplexer, PaneInfo, TmuxMultiplexer};
use crate::paths::Paths;
use crate::prompt::{self, Prompt};
use crate::result::{self, AgentResult};
use crate::scheduler;
use crate::template;
use crate::worktree;

/// Initialize a project: verify it's a git repo, lay out `.ppg/`, write a
/// starter config and an empty manifest. Safe to call repeatedly.
pub fn init(project_root: &Path) -> Result<()> {
    if !git::is_git_repo()? {
        return Err(PpgError::NotGitRepo.into());
    }
    let paths = Paths::new(project_root.to_path_buf());
    let config = Config::load(&paths)?;
    manifest::init(&paths, config.session_name.as_deref().unwrap_or("ppg"))?;
    Config::write_example(&paths)?;
    Ok(())
}

pub struct SpawnRequest<'a> {
    pub worktree_name: &'a str,
    pub agent_key: Option<&'a str>,
    pub prompt: Prompt,
    pub base: Option<&'a str>,
}

pub struct SpawnOutcome {
    pub worktree_id: String,
    pub agent_id: String,
    pub pane: String,
}

#[allow(clippy::too_many_arguments)]
fn builtin_vars(
    worktree_path: &Path,
    branch: &str,
    agent_id: &str,
    result_path: &Path,
    project_root: &Path,
    task_name: &str,
    prompt_body: &str,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert(template::WORKTREE_PATH.to_string(), worktree_path.display().to_string());
    vars.insert(template::BRANCH.to_string(), branch.to_string());
    vars.insert(template::AGENT_ID.to_string(), agent_id.to_string());
    vars.insert(template::RESULT_FILE.to_string(), result_path.display().to_string());
    vars.insert(template::PROJECT_ROOT.to_string(), project_root.display().to_string());
    vars.insert(template::TASK_NAME.to_string(), task_name.to_string());
    vars.insert(template::PROMPT.to_string(), prompt_body.to_string());
    vars
}

/// Spawn a new agent, creating its worktree (and tmux window) if this is the
/// first agent for `worktree_name`, or splitting a new pane into the
/// existing window otherwise.
pub fn spawn(paths: &Paths, config: &Config, mux: &dyn Multiplexer, project_root: &Path, request: SpawnRequest) -> Result<SpawnOutcome> {
    let agent_cfg = config.resolve_agent(request.agent_key)?.clone();
    let session = config.session_name.clone().unwrap_or_else(|| "ppg".to_string());
    mux.ensure_session(&session, project_root)?;

    let snapshot = manifest::read(paths)?;
    let existing = snapshot.find_worktree(request.worktree_name).cloned();

    let (worktree_id, branch, worktree_path, window, pane, base_branch) = match existing {
        Some(wt) => {
            let anchor = wt.agents.values().next().map(|a| a.tmux_target.clone()).unwrap_or_else(|| wt.tmux_window.clone());
            let pane = mux.split_pane(&anchor, &wt.path).context("Failed to open a pane for the new agent")?;
            (wt.id, wt.branch, wt.path, wt.tmux_window, pane, wt.base_branch)
        }
        None => {
            let base = match request.base {
                Some(b) => b.to_string(),
                None => git::get_current_branch()?,
            };
            let worktree_id = crate::paths::mint_worktree_id(|id| snapshot.worktree_exists(id));
            let branch = format!("{}/{}", config.branch_prefix, request.worktree_name);
            let worktree_path = worktree::worktrees_root(project_root, config).join(&worktree_id);
            worktree::create(config, project_root, &worktree_path, &branch, &base)?;
            let pane = mux.create_window(&session, request.worktree_name, &worktree_path).context("Failed to open a tmux window for the new worktree")?;
            (worktree_id, branch, worktree_path, pane.clone(), pane, base)
        }
    };

    let agent_id = crate::paths::mint_agent_id(|id| snapshot.agent_exists(id));
    let result_path = paths.result_path(&agent_id);
    let prompt_path = paths.prompt_path(&agent_id);

    let doc = prompt::parse_prompt_document(&request.prompt)?;
    let vars = builtin_vars(&worktree_path, &branch, &agent_id, &result_path, project_root, request.worktree_name, &doc.body);
    let rendered_prompt = template::render(&doc.body, &vars);

    std::fs::write(&prompt_path, &rendered_prompt).with_context(|| format!("Failed to write prompt file at {}", prompt_path.display()))?;

    agent::launch(mux, &pane, &agent_cfg, &prompt_path, &rendered_prompt)?;

    let now = Utc::now();
    let agent_record = Agent {
        id: agent_id.clone(),
        name: agent_cfg.name.clone(),
        agent_type: agent_cfg.name.clone(),
        status: AgentStatus::Running,
        tmux_target: pane.clone(),
        prompt: manifest::truncate_prompt_for_storage(&rendered_prompt),
        result_file: result_path,
        started_at: now,
        completed_at: None,
        exit_code: None,
        error: None,
    };

    let worktree_id_for_update = worktree_id.clone();
    let worktree_name = request.worktree_name.to_string();
    manifest::update(paths, move |mut m| {
        if let Some(wt) = m.find_worktree_mut(&worktree_id_for_update) {
            wt.agents.insert(agent_record.id.clone(), agent_record.clone());
        } else {
            let mut wt = Worktree {
                id: worktree_id_for_update.clone(),
                name: worktree_name.clone(),
                path: worktree_path.clone(),
                branch: branch.clone(),
                base_branch: base_branch.clone(),
                status: WorktreeStatus::Active,
                tmux_window: window.clone(),
                agents: BTreeMap::new(),
                created_at: now,
                merged_at: None,
            };
            wt.agents.insert(agent_record.id.clone(), agent_record.clone());
            m.worktrees.insert(worktree_id_for_update.clone(), wt);
        }
        Ok(m)
    })?;

    Ok(SpawnOutcome { worktree_id, agent_id, pane })
}

/// Spawn a matrix of worktrees from a single prompt template whose
/// frontmatter declares a `foreach` variable matrix -- one worktree per row,
/// named `<name_prefix>-<row index>`. Grounds the "swarm" concept named by
/// schedule entries on the same row/column substitution `prompt.rs` already
/// does for frontmatter-driven prompts.
pub fn spawn_swarm(
    paths: &Paths,
    config: &Config,
    mux: &dyn Multiplexer,
    project_root: &Path,
    template_path: &Path,
    name_prefix: &str,
    extra_vars: &BTreeMap<String, String>,
) -> Result<Vec<SpawnOutcome>> {
    let doc = prompt::parse_prompt_document(&Prompt::FromFile(template_path.to_path_buf()))?;
    let foreach = doc
        .meta
        .foreach
        .clone()
        .with_context(|| format!("Swarm template '{}' has no foreach matrix in its frontmatter", template_path.display()))?;
    let rows = prompt::foreach_from_frontmatter(&foreach)?;

    let mut outcomes = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        let mut vars = extra_vars.clone();
        vars.extend(row);
        let rendered = template::render(&doc.body, &vars);
        let worktree_name = format!("{name_prefix}-{idx}");
        let outcome = spawn(
            paths,
            config,
            mux,
            project_root,
            SpawnRequest {
                worktree_name: &worktree_name,
                agent_key: None,
                prompt: Prompt::Inline(rendered),
                base: None,
            },
        )?;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Re-launch an agent's last prompt in its existing pane. Refuses if the
/// worktree checkout has been cleaned (its directory no longer exists) --
/// there is no pane left to restart into.
pub fn restart(paths: &Paths, config: &Config, mux: &dyn Multiplexer, agent_id: &str) -> Result<()> {
    let manifest = manifest::read(paths)?;
    let (wt, agent) = manifest.find_agent(agent_id).ok_or_else(|| PpgError::AgentNotFound(agent_id.to_string()))?;

    if !wt.path.exists() {
        return Err(PpgError::WorktreeNotFound(wt.name.clone()).into());
    }

    let agent_cfg = config
        .agent(&agent.agent_type)
        .with_context(|| format!("Agent type '{}' is no longer configured", agent.agent_type))?
        .clone();
    let prompt_path = paths.prompt_path(agent_id);
    let rendered_prompt = agent.prompt.clone();
    let pane = agent.tmux_target.clone();

    agent::launch(mux, &pane, &agent_cfg, &prompt_path, &rendered_prompt)?;

    let agent_id_owned = agent_id.to_string();
    manifest::update(paths, move |mut m| {
        if let Some(a) = m.find_agent_mut(&agent_id_owned) {
            a.status = AgentStatus::Running;
            a.started_at = Utc::now();
            a.completed_at = None;
            a.exit_code = None;
            a.error = None;
        }
        Ok(m)
    })?;
    Ok(())
}

/// Kill one agent: Ctrl-C, grace window, force-kill if still alive.
pub fn kill(paths: &Paths, mux: &dyn Multiplexer, agent_id: &str) -> Result<()> {
    let manifest = manifest::read(paths)?;
    let (_, target) = manifest.find_agent(agent_id).ok_or_else(|| PpgError::AgentNotFound(agent_id.to_string()))?;
    if target.status.is_terminal() {
        return Ok(());
    }
    agent::kill(mux, &target.tmux_target)?;

    let agent_id_owned = agent_id.to_string();
    manifest::update(paths, move |mut m| {
        if let Some(a) = m.find_agent_mut(&agent_id_owned) {
            agent::apply_status(a, AgentStatus::Killed, a.exit_code);
        }
        Ok(m)
    })?;
    Ok(())
}

/// Kill every non-terminal agent, optionally scoped to one worktree, all in
/// parallel (Ctrl-C to all, one grace wait, parallel force-kill).
pub fn kill_all(paths: &Paths, mux: &(dyn Multiplexer + 'static), worktree_filter: Option<&str>) -> Result<Vec<(String, Result<()>)>> {
    let manifest = manifest::read(paths)?;
    let mut targets: Vec<(String, String)> = Vec::new();
    for wt in manifest.worktrees.values() {
        if let Some(name) = worktree_filter {
            if wt.name != name && wt.id != name {
                continue;
            }
        }
        for a in wt.non_terminal_agents() {
            targets.push((a.id.clone(), a.tmux_target.clone()));
        }
    }

    let panes: Vec<String> = targets.iter().map(|(_, pane)| pane.clone()).collect();
    let kill_results = agent::kill_all(mux, panes);

    let mut outcomes: Vec<(String, Result<()>)> = Vec::with_capacity(targets.len());
    let mut succeeded: Vec<String> = Vec::new();
    for ((agent_id, _pane), (_returned_pane, result)) in targets.into_iter().zip(kill_results.into_iter()) {
        if result.is_ok() {
            succeeded.push(agent_id.clone());
        }
        outcomes.push((agent_id, result));
    }

    if !succeeded.is_empty() {
        manifest::update(paths, move |mut m| {
            for agent_id in &succeeded {
                if let Some(a) = m.find_agent_mut(agent_id) {
                    agent::apply_status(a, AgentStatus::Killed, a.exit_code);
                }
            }
            Ok(m)
        })?;
    }
    Ok(outcomes)
}

/// Refresh every non-terminal agent's status from observable signals (pane
/// state, result-file presence, worktree-directory presence) and persist
/// any transitions. Returns the manifest after refreshing.
///
/// Fetches exactly one session-wide pane listing (SPEC_FULL.md §4.6/§5/§8:
/// "one session-wide pane listing ... apply the detector per agent in
/// parallel"), joins it in memory against the manifest's agents, then runs
/// the signal-stack detector for every non-terminal agent concurrently --
/// collapsing what would otherwise be one `pane_info` subprocess call per
/// agent into a single `list_panes` call plus parallel filesystem checks.
pub fn refresh_all(paths: &Paths, config: &Config, mux: &dyn Multiplexer) -> Result<Manifest> {
    let manifest = manifest::read(paths)?;
    let session = config.session_name.clone().unwrap_or_else(|| "ppg".to_string());
    let pane_map: HashMap<String, PaneInfo> = mux.list_panes(&session)?.into_iter().map(|p| (p.pane_id.clone(), p)).collect();

    let mut updates: Vec<(String, AgentStatus, Option<i32>)> = Vec::new();
    let mut cleaned_worktrees: Vec<String> = Vec::new();
    let mut detect_targets: Vec<(String, AgentStatus, bool, Option<PaneInfo>, PathBuf)> = Vec::new();

    for wt in manifest.worktrees.values() {
        if wt.status.is_terminal() {
            continue;
        }
        if !wt.path.exists() {
            for a in wt.non_terminal_agents() {
                updates.push((a.id.clone(), AgentStatus::Lost, None));
            }
            cleaned_worktrees.push(wt.id.clone());
            continue;
        }
        for a in wt.non_terminal_agents() {
            let interactive = config.agent(&a.agent_type).map(|c| c.interactive).unwrap_or(false);
            let pane_info = pane_map.get(&a.tmux_target).cloned();
            detect_targets.push((a.id.clone(), a.status, interactive, pane_info, a.result_file.clone()));
        }
    }

    let detected: Vec<(String, AgentStatus, AgentStatus, Option<i32>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = detect_targets
            .into_iter()
            .map(|(agent_id, prior_status, interactive, pane_info, result_file)| {
                scope.spawn(move || {
                    let result_file_exists = result_file.exists();
                    let (status, code) =
                        agent::detect_status(prior_status, interactive, pane_info.as_ref(), result_file_exists, || result_file.exists());
                    (agent_id, prior_status, status, code)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("status-detect worker panicked")).collect()
    });

    for (agent_id, prior_status, status, code) in detected {
        if status != prior_status {
            updates.push((agent_id, status, code));
        }
    }

    if updates.is_empty() && cleaned_worktrees.is_empty() {
        return Ok(manifest);
    }

    manifest::update(paths, move |mut m| {
        for (agent_id, status, code) in &updates {
            if let Some(a) = m.find_agent_mut(agent_id) {
                agent::apply_status(a, *status, *code);
            }
        }
        for worktree_id in &cleaned_worktrees {
            if let Some(wt) = m.worktrees.get_mut(worktree_id) {
                wt.status = WorktreeStatus::Cleaned;
            }
        }
        Ok(m)
    })
}

/// Wait for every id in `agent_ids` to reach a terminal state, refreshing
/// status each poll. Returns `AgentsFailed` if any ended up `failed`/`lost`,
/// `WaitTimeout` if `timeout` elapses first.
pub fn wait(paths: &Paths, config: &Config, mux: &dyn Multiplexer, agent_ids: &[String], timeout: Duration, poll_interval: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let manifest = refresh_all(paths, config, mux)?;

        let mut all_terminal = true;
        let mut any_failed = false;
        for id in agent_ids {
            match manifest.find_agent(id) {
                Some((_, agent)) => {
                    if !agent.status.is_terminal() {
                        all_terminal = false;
                    }
                    if matches!(agent.status, AgentStatus::Failed | AgentStatus::Lost) {
                        any_failed = true;
                    }
                }
                None => return Err(PpgError::AgentNotFound(id.clone()).into()),
            }
        }

        if all_terminal {
            return if any_failed { Err(PpgError::AgentsFailed.into()) } else { Ok(()) };
        }
        if Instant::now() >= deadline {
            return Err(PpgError::WaitTimeout { secs: timeout.as_secs() }.into());
        }
        std::thread::sleep(poll_interval);
    }
}

/// Merge a worktree's branch into the current branch. Refuses while agents
/// are still running unless `force`. Stages `merging` -> `merged`/`failed`
/// manifest transitions around the git-level merge.
#[allow(clippy::too_many_arguments)]
pub fn merge_worktree(
    paths: &Paths,
    config: &Config,
    mux: &dyn Multiplexer,
    project_root: &Path,
    worktree_name: &str,
    strategy: MergeStrategy,
    force: bool,
) -> Result<()> {
    let manifest = manifest::read(paths)?;
    let wt = manifest.find_worktree(worktree_name).ok_or_else(|| PpgError::WorktreeNotFound(worktree_name.to_string()))?;

    if !force && !wt.all_agents_terminal() {
        return Err(PpgError::AgentsRunning.into());
    }

    let branch = wt.branch.clone();
    let worktree_id = wt.id.clone();

    let worktree_id_for_merging = worktree_id.clone();
    manifest::update(paths, move |mut m| {
        if let Some(wt) = m.find_worktree_mut(&worktree_id_for_merging) {
            wt.status = WorktreeStatus::Merging;
        }
        Ok(m)
    })?;

    let commit_msg = merge::commit_message(&config.branch_prefix, worktree_name, &branch);
    let merge_result = merge::merge_branch(project_root, &branch, strategy, &commit_msg);

    let worktree_id_for_final = worktree_id.clone();
    let final_status = if merge_result.is_ok() { WorktreeStatus::Merged } else { WorktreeStatus::Failed };
    let now = Utc::now();
    manifest::update(paths, move |mut m| {
        if let Some(wt) = m.find_worktree_mut(&worktree_id_for_final) {
            wt.status = final_status;
            if final_status == WorktreeStatus::Merged {
                wt.merged_at = Some(now);
            }
        }
        Ok(m)
    })?;

    merge_result?;

    // Cleanup (kill window, teardown env, remove worktree + branch) runs
    // automatically after a successful merge. If it fails, the worktree
    // stays `merged` -- the user can re-run `clean` to retry.
    if let Err(e) = clean(paths, mux, &worktree_id, true) {
        tracing::warn!(error = %e, worktree = %worktree_id, "merge:post-merge cleanup failed, worktree left at 'merged'");
    }

    Ok(())
}

/// Tear down a worktree: kill its tmux window, remove the checkout and
/// branch, mark it `cleaned`. Refuses on unmerged work unless `force`.
pub fn clean(paths: &Paths, mux: &dyn Multiplexer, worktree_name: &str, force: bool) -> Result<()> {
    let manifest = manifest::read(paths)?;
    let wt = manifest.find_worktree(worktree_name).ok_or_else(|| PpgError::WorktreeNotFound(worktree_name.to_string()))?;

    if !force && wt.status != WorktreeStatus::Merged {
        return Err(PpgError::UnmergedWork(worktree_name.to_string()).into());
    }

    if let Err(e) = mux.kill_window(&wt.tmux_window) {
        tracing::warn!(error = %e, window = %wt.tmux_window, "clean:kill-window failed, continuing teardown");
    }

    worktree::teardown(&wt.path, &wt.branch)?;

    let worktree_id = wt.id.clone();
    manifest::update(paths, move |mut m| {
        if let Some(wt) = m.find_worktree_mut(&worktree_id) {
            wt.status = WorktreeStatus::Cleaned;
        }
        Ok(m)
    })?;
    Ok(())
}

/// Gather result documents for one worktree (or every worktree), falling
/// back to a pane tail for failed/killed/lost agents with no result file.
pub fn collect_results(paths: &Paths, worktree_filter: Option<&str>, mux: Option<&dyn Multiplexer>) -> Result<Vec<AgentResult>> {
    let manifest = manifest::read(paths)?;
    Ok(result::collect(&manifest, paths, worktree_filter, mux))
}

pub fn schedule_list(paths: &Paths) -> Result<Vec<scheduler::ScheduleEntry>> {
    Ok(scheduler::SchedulesDocument::load(paths)?.entries)
}

pub fn schedule_add(paths: &Paths, entry: scheduler::ScheduleEntry) -> Result<()> {
    scheduler::parse_cron(&entry.cron)?;
    let mut doc = scheduler::SchedulesDocument::load(paths)?;
    if doc.entries.iter().any(|e| e.name == entry.name) {
        return Err(PpgError::InvalidArgs(format!("schedule entry '{}' already exists", entry.name)).into());
    }
    doc.entries.push(entry);
    doc.save(paths)
}

pub fn schedule_remove(paths: &Paths, name: &str) -> Result<bool> {
    let mut doc = scheduler::SchedulesDocument::load(paths)?;
    let before = doc.entries.len();
    doc.entries.retain(|e| e.name != name);
    let removed = doc.entries.len() != before;
    if removed {
        doc.save(paths)?;
    }
    Ok(removed)
}

pub fn schedule_status() -> Result<scheduler::DaemonStatus> {
    scheduler::status()
}

pub fn schedule_stop() -> Result<bool> {
    scheduler::stop()
}

/// Run the scheduler daemon in the foreground for `project_root`'s
/// `.ppg/schedules.yaml`, firing due entries by calling `spawn`/
/// `spawn_swarm` directly. Blocks until SIGINT/SIGTERM.
pub fn schedule_start(project_root: &Path) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let config = Config::load(&paths)?;
    let mux = TmuxMultiplexer::new();

    scheduler::write_pid_file()?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = stop_flag.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install signal handler")?;

    let project_root = project_root.to_path_buf();
    let fire = move |entry: &scheduler::ScheduleEntry| -> Result<()> {
        match &entry.invoke {
            scheduler::Invoke::Prompt(text) => {
                let name = format!("{}-{}", entry.name, Utc::now().format("%Y%m%d%H%M%S"));
                let rendered = template::render(text, &entry.vars);
                spawn(
                    &paths,
                    &config,
                    &mux,
                    &project_root,
                    SpawnRequest {
                        worktree_name: &name,
                        agent_key: None,
                        prompt: Prompt::Inline(rendered),
                        base: None,
                    },
                )
                .map(|_| ())
            }
            scheduler::Invoke::Swarm(template_name) => {
                let template_path = paths.templates_dir().join(format!("{template_name}.md"));
                spawn_swarm(&paths, &config, &mux, &project_root, &template_path, &entry.name, &entry.vars).map(|_| ())
            }
        }
    };

    let schedules_path = paths.schedules_path();
    let result = scheduler::run_loop(&schedules_path, &fire, scheduler::append_log_line, move || stop_flag.load(Ordering::SeqCst));

    scheduler::remove_pid_file();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiplexer::PaneInfo;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// An in-memory fake so workflow tests never shell out to a real tmux.
    struct FakeMux {
        panes: Mutex<HashMap<String, PaneInfo>>,
        next_pane: Mutex<u32>,
    }

    impl FakeMux {
        fn new() -> Self {
            Self { panes: Mutex::new(HashMap::new()), next_pane: Mutex::new(1) }
        }

        fn mint_pane(&self) -> String {
            let mut next = self.next_pane.lock().unwrap();
            let id = format!("%{next}");
            *next += 1;
            id
        }
    }

    impl Multiplexer for FakeMux {
        fn ensure_session(&self, _session: &str, _cwd: &Path) -> Result<()> {
            Ok(())
        }

        fn create_window(&self, _session: &str, _name: &str, _cwd: &Path) -> Result<String> {
            let pane = self.mint_pane();
            self.panes.lock().unwrap().insert(
                pane.clone(),
                PaneInfo { pane_id: pane.clone(), pane_pid: 1, current_command: "claude".into(), dead: false, dead_status: None, window_index: 0 },
            );
            Ok(pane)
        }

        fn split_pane(&self, _target: &str, _cwd: &Path) -> Result<String> {
            self.create_window("", "", Path::new("."))
        }

        fn send_literal(&self, _target: &str, _text: &str) -> Result<()> {
            Ok(())
        }

        fn send_enter(&self, _target: &str) -> Result<()> {
            Ok(())
        }

        fn send_ctrl_c(&self, _target: &str) -> Result<()> {
            Ok(())
        }

        fn list_panes(&self, _session: &str) -> Result<Vec<PaneInfo>> {
            Ok(self.panes.lock().unwrap().values().cloned().collect())
        }

        fn pane_info(&self, target: &str) -> Result<Option<PaneInfo>> {
            Ok(self.panes.lock().unwrap().get(target).cloned())
        }

        fn capture_pane(&self, _target: &str, _lines: Option<u32>) -> Result<String> {
            Ok(String::new())
        }

        fn resize_pane(&self, _target: &str, _cols: u16, _rows: u16) -> Result<()> {
            Ok(())
        }

        fn kill_window(&self, target: &str) -> Result<()> {
            self.panes.lock().unwrap().remove(target);
            Ok(())
        }

        fn kill_pane(&self, target: &str) -> Result<()> {
            self.panes.lock().unwrap().remove(target);
            Ok(())
        }
    }

    fn test_paths() -> (tempfile::TempDir, Paths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().to_path_buf());
        manifest::init(&paths, "ppg-test").unwrap();
        (dir, paths)
    }

    #[test]
    fn builtin_vars_include_every_documented_key() {
        let vars = builtin_vars(Path::new("/tmp/wt"), "ppg/t1", "ag-1", Path::new("/tmp/r.md"), Path::new("/tmp/proj"), "t1", "do the thing");
        assert_eq!(vars.get(template::WORKTREE_PATH).unwrap(), "/tmp/wt");
        assert_eq!(vars.get(template::BRANCH).unwrap(), "ppg/t1");
        assert_eq!(vars.get(template::AGENT_ID).unwrap(), "ag-1");
        assert_eq!(vars.get(template::TASK_NAME).unwrap(), "t1");
        assert_eq!(vars.get(template::RESULT_FILE).unwrap(), "/tmp/r.md");
        assert_eq!(vars.get(template::PROJECT_ROOT).unwrap(), "/tmp/proj");
        assert_eq!(vars.get(template::PROMPT).unwrap(), "do the thing");
    }

    #[test]
    fn schedule_add_rejects_duplicate_names() {
        let (_dir, paths) = test_paths();
        let entry = scheduler::ScheduleEntry {
            name: "nightly".into(),
            cron: "0 2 * * *".into(),
            invoke: scheduler::Invoke::Prompt("run the tests".into()),
            vars: BTreeMap::new(),
            project_path: paths.project_root().to_path_buf(),
        };
        schedule_add(&paths, entry.clone()).unwrap();
        let err = schedule_add(&paths, entry).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn schedule_add_rejects_invalid_cron() {
        let (_dir, paths) = test_paths();
        let entry = scheduler::ScheduleEntry {
            name: "bad".into(),
            cron: "not a cron".into(),
            invoke: scheduler::Invoke::Prompt("x".into()),
            vars: BTreeMap::new(),
            project_path: paths.project_root().to_path_buf(),
        };
        assert!(schedule_add(&paths, entry).is_err());
    }

    #[test]
    fn schedule_remove_reports_whether_an_entry_existed() {
        let (_dir, paths) = test_paths();
        let entry = scheduler::ScheduleEntry {
            name: "nightly".into(),
            cron: "0 2 * * *".into(),
            invoke: scheduler::Invoke::Prompt("run the tests".into()),
            vars: BTreeMap::new(),
            project_path: paths.project_root().to_path_buf(),
        };
        schedule_add(&paths, entry).unwrap();
        assert!(schedule_remove(&paths, "nightly").unwrap());
        assert!(!schedule_remove(&paths, "nightly").unwrap());
    }

    #[test]
    fn kill_all_is_noop_on_empty_manifest() {
        let (_dir, paths) = test_paths();
        let mux = FakeMux::new();
        let outcomes = kill_all(&paths, &mux, None).unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn restart_refuses_when_worktree_directory_is_gone() {
        let (dir, paths) = test_paths();
        let missing_path = dir.path().join(".worktrees/wt-ghost");

        manifest::update(&paths, |mut m| {
            let agent = Agent {
                id: "ag-1".into(),
                name: "claude".into(),
                agent_type: "claude".into(),
                status: AgentStatus::Failed,
                tmux_target: "%1".into(),
                prompt: "do it".into(),
                result_file: paths.result_path("ag-1"),
                started_at: Utc::now(),
                completed_at: Some(Utc::now()),
                exit_code: Some(1),
                error: None,
            };
            let mut wt = Worktree {
                id: "wt-ghost".into(),
                name: "ghost".into(),
                path: missing_path.clone(),
                branch: "ppg/ghost".into(),
                base_branch: "main".into(),
                status: WorktreeStatus::Active,
                tmux_window: "ppg:1".into(),
                agents: BTreeMap::new(),
                created_at: Utc::now(),
                merged_at: None,
            };
            wt.agents.insert(agent.id.clone(), agent);
            m.worktrees.insert(wt.id.clone(), wt);
            Ok(m)
        })
        .unwrap();

        let config = Config::default();
        let mux = FakeMux::new();
        let err = restart(&paths, &config, &mux, "ag-1").unwrap_err();
        assert_eq!(err.downcast_ref::<PpgError>().unwrap().code(), "WORKTREE_NOT_FOUND");
    }

    #[test]
    fn refresh_all_cleans_worktree_whose_directory_vanished() {
        let (dir, paths) = test_paths();
        let missing_path = dir.path().join(".worktrees/wt-ghost");

        manifest::update(&paths, |mut m| {
            let agent = Agent {
                id: "ag-1".into(),
                name: "claude".into(),
                agent_type: "claude".into(),
                status: AgentStatus::Running,
                tmux_target: "%1".into(),
                prompt: "do it".into(),
                result_file: paths.result_path("ag-1"),
                started_at: Utc::now(),
                completed_at: None,
                exit_code: None,
                error: None,
            };
            let mut wt = Worktree {
                id: "wt-ghost".into(),
                name: "ghost".into(),
                path: missing_path.clone(),
                branch: "ppg/ghost".into(),
                base_branch: "main".into(),
                status: WorktreeStatus::Active,
                tmux_window: "ppg:1".into(),
                agents: BTreeMap::new(),
                created_at: Utc::now(),
                merged_at: None,
            };
            wt.agents.insert(agent.id.clone(), agent);
            m.worktrees.insert(wt.id.clone(), wt);
            Ok(m)
        })
        .unwrap();

        let config = Config::default();
        let mux = FakeMux::new();
        let manifest = refresh_all(&paths, &config, &mux).unwrap();

        let wt = manifest.find_worktree("wt-ghost").unwrap();
        assert_eq!(wt.status, WorktreeStatus::Cleaned);
        let (_, agent) = manifest.find_agent("ag-1").unwrap();
        assert_eq!(agent.status, AgentStatus::Lost);
    }

    #[test]
    fn wait_returns_immediately_when_agent_is_already_terminal() {
        let (_dir, paths) = test_paths();
        manifest::update(&paths, |mut m| {
            let agent = Agent {
                id: "ag-1".into(),
                name: "claude".into(),
                agent_type: "claude".into(),
                status: AgentStatus::Completed,
                tmux_target: "%1".into(),
                prompt: "do it".into(),
                result_file: paths.result_path("ag-1"),
                started_at: Utc::now(),
                completed_at: Some(Utc::now()),
                exit_code: Some(0),
                error: None,
            };
            let mut wt = Worktree {
                id: "wt-1".into(),
                name: "t1".into(),
                path: paths.project_root().to_path_buf(),
                branch: "ppg/t1".into(),
                base_branch: "main".into(),
                status: WorktreeStatus::Active,
                tmux_window: "ppg:1".into(),
                agents: BTreeMap::new(),
                created_at: Utc::now(),
                merged_at: None,
            };
            wt.agents.insert(agent.id.clone(), agent);
            m.worktrees.insert(wt.id.clone(), wt);
            Ok(m)
        })
        .unwrap();

        let config = Config::default();
        let mux = FakeMux::new();
        wait(&paths, &config, &mux, &["ag-1".to_string()], Duration::from_secs(5), Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn wait_reports_agents_failed_once_terminal() {
        let (_dir, paths) = test_paths();
        manifest::update(&paths, |mut m| {
            let agent = Agent {
                id: "ag-1".into(),
                name: "claude".into(),
                agent_type: "claude".into(),
                status: AgentStatus::Failed,
                tmux_target: "%1".into(),
                prompt: "do it".into(),
                result_file: paths.result_path("ag-1"),
                started_at: Utc::now(),
                completed_at: Some(Utc::now()),
                exit_code: Some(1),
                error: None,
            };
            let mut wt = Worktree {
                id: "wt-1".into(),
                name: "t1".into(),
                path: paths.project_root().to_path_buf(),
                branch: "ppg/t1".into(),
                base_branch: "main".into(),
                status: WorktreeStatus::Active,
                tmux_window: "ppg:1".into(),
                agents: BTreeMap::new(),
                created_at: Utc::now(),
                merged_at: None,
            };
            wt.agents.insert(agent.id.clone(), agent);
            m.worktrees.insert(wt.id.clone(), wt);
            Ok(m)
        })
        .unwrap();

        let config = Config::default();
        let mux = FakeMux::new();
        let err = wait(&paths, &config, &mux, &["ag-1".to_string()], Duration::from_secs(5), Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.downcast_ref::<PpgError>().unwrap().code(), "AGENTS_FAILED");
    }

    #[test]
    fn wait_times_out_on_a_still_running_agent() {
        let (_dir, paths) = test_paths();
        manifest::update(&paths, |mut m| {
            let agent = Agent {
                id: "ag-1".into(),
                name: "claude".into(),
                agent_type: "claude".into(),
                status: AgentStatus::Running,
                tmux_target: "%1".into(),
                prompt: "do it".into(),
                result_file: paths.result_path("ag-1"),
                started_at: Utc::now(),
                completed_at: None,
                exit_code: None,
                error: None,
            };
            let mut wt = Worktree {
                id: "wt-1".into(),
                name: "t1".into(),
                path: paths.project_root().to_path_buf(),
                branch: "ppg/t1".into(),
                base_branch: "main".into(),
                status: WorktreeStatus::Active,
                tmux_window: "ppg:1".into(),
                agents: BTreeMap::new(),
                created_at: Utc::now(),
                merged_at: None,
            };
            wt.agents.insert(agent.id.clone(), agent);
            m.worktrees.insert(wt.id.clone(), wt);
            Ok(m)
        })
        .unwrap();

        let config = Config::default();
        let mux = FakeMux::new();
        mux.create_window("", "", Path::new(".")).ok();
        let err = wait(&paths, &config, &mux, &["ag-1".to_string()], Duration::from_millis(20), Duration::from_millis(5)).unwrap_err();
        assert_eq!(err.downcast_ref::<PpgError>().unwrap().code(), "WAIT_TIMEOUT");
    }
}
