//! The cron scheduler daemon (SPEC_FULL.md §4.8): a single long-running
//! process per user that fires configured schedule entries by calling the
//! core orchestration workflows directly (same process, no RPC).

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::paths::Paths;

/// What a schedule entry fires: a named swarm (a batch of agent spawns
/// defined in the project's swarm document) or a one-off prompt spawn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum Invoke {
    Swarm(String),
    Prompt(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub name: String,
    pub cron: String,
    pub invoke: Invoke,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    pub project_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulesDocument {
    #[serde(default)]
    pub entries: Vec<ScheduleEntry>,
}

impl SchedulesDocument {
    pub fn load(paths: &Paths) -> Result<Self> {
        let path = paths.schedules_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        let path = paths.schedules_path();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize schedules document")?;
        fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Parse a standard five-field cron expression (minute hour day-of-month
/// month day-of-week). The `cron` crate requires a leading seconds field;
/// a fixed `0` is prepended so callers only ever write the five fields §6
/// documents.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(anyhow!("cron expression must have exactly 5 fields, got {}: '{expr}'", fields.len()));
    }
    let six_field = format!("0 {expr}");
    Schedule::from_str(&six_field).with_context(|| format!("Invalid cron expression: '{expr}'"))
}

pub fn next_run(entry: &ScheduleEntry, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let schedule = parse_cron(&entry.cron)?;
    Ok(schedule.after(&after).next())
}

fn xdg_state_home() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    home::home_dir()
        .map(|h| h.join(".local").join("state"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn scheduler_state_dir() -> PathBuf {
    xdg_state_home().join("ppg").join("scheduler")
}

pub fn pid_path() -> PathBuf {
    scheduler_state_dir().join("ppg.pid")
}

pub fn log_path() -> PathBuf {
    scheduler_state_dir().join("ppg.log")
}

/// pid liveness is checked by signaling the recorded pid with signal 0, not
/// by the pid file's mere presence -- a stale file from a crashed daemon must
/// never read as "alive".
pub fn pid_is_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(i32),
    Stopped,
}

pub fn status() -> Result<DaemonStatus> {
    let path = pid_path();
    let Ok(contents) = fs::read_to_string(&path) else {
        return Ok(DaemonStatus::Stopped);
    };
    let pid: i32 = contents.trim().parse().context("Corrupt scheduler pid file")?;
    if pid_is_alive(pid) {
        Ok(DaemonStatus::Running(pid))
    } else {
        let _ = fs::remove_file(&path);
        Ok(DaemonStatus::Stopped)
    }
}

/// Write the pid file for the current process. Called by the daemon itself
/// once it is ready to serve, never by `start`'s parent.
pub fn write_pid_file() -> Result<()> {
    let dir = scheduler_state_dir();
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let pid = std::process::id();
    fs::write(pid_path(), pid.to_string()).context("Failed to write scheduler pid file")
}

/// Remove the pid file and close out the log on clean stop.
pub fn remove_pid_file() {
    let _ = fs::remove_file(pid_path());
}

pub fn stop() -> Result<bool> {
    match status()? {
        DaemonStatus::Stopped => Ok(false),
        DaemonStatus::Running(pid) => {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
            for _ in 0..20 {
                if !pid_is_alive(pid) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            let _ = fs::remove_file(pid_path());
            Ok(true)
        }
    }
}

/// One callback invocation per fired entry; `workflow.rs` supplies the real
/// spawn/swarm-spawn implementation so this module stays free of manifest
/// and multiplexer dependencies (it only knows about timing).
pub type FireFn<'a> = dyn Fn(&ScheduleEntry) -> Result<()> + 'a;

/// Run the tick loop forever (until `should_stop` returns true), evaluating
/// every entry in `schedules_path` once per minute. A per-entry last-fired
/// timestamp guards against double-firing within the same minute if a tick
/// is slow.
pub fn run_loop(
    schedules_path: &Path,
    fire: &FireFn,
    mut log_line: impl FnMut(&str),
    should_stop: impl Fn() -> bool,
) -> Result<()> {
    let mut last_fired: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();

    loop {
        if should_stop() {
            log_line("scheduler:stop received, draining current minute");
            return Ok(());
        }

        let doc = match load_schedules(schedules_path) {
            Ok(doc) => doc,
            Err(e) => {
                log_line(&format!("scheduler:tick failed to load schedules: {e}"));
                std::thread::sleep(Duration::from_secs(60));
                continue;
            }
        };

        let now = Utc::now();
        for entry in &doc.entries {
            let due = match next_run(entry, now - chrono::Duration::minutes(1)) {
                Ok(Some(t)) => t <= now,
                Ok(None) => false,
                Err(e) => {
                    log_line(&format!("scheduler:tick bad cron for '{}': {e}", entry.name));
                    continue;
                }
            };
            if !due {
                continue;
            }
            let same_minute = last_fired.get(&entry.name).map(|t| t.format("%Y%m%d%H%M").to_string())
                == Some(now.format("%Y%m%d%H%M").to_string());
            if same_minute {
                continue;
            }

            log_line(&format!("scheduler:fire '{}'", entry.name));
            if let Err(e) = fire(entry) {
                log_line(&format!("scheduler:fire '{}' failed: {e}", entry.name));
            }
            last_fired.insert(entry.name.clone(), now);
        }

        std::thread::sleep(Duration::from_secs(60));
    }
}

fn load_schedules(schedules_path: &Path) -> Result<SchedulesDocument> {
    if !schedules_path.exists() {
        return Ok(SchedulesDocument::default());
    }
    let contents = fs::read_to_string(schedules_path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

pub fn append_log_line(line: &str) {
    let path = log_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(mut f) = fs::OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(f, "{} {}", Utc::now().to_rfc3339(), line);
    }
}
