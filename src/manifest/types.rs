//! The manifest document: the sole source of durable, per-project state.
//!
//! Kept as plain value types -- structs of maps, not an object graph with
//! back-pointers. Parent references (which worktree owns an agent) are
//! re-derived at use sites rather than stored.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: u32 = 1;

/// Status of a worktree. Terminal statuses are `Merged`, `Failed`, `Cleaned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorktreeStatus {
    Active,
    Merging,
    Merged,
    Failed,
    Cleaned,
}

impl WorktreeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorktreeStatus::Merged | WorktreeStatus::Failed | WorktreeStatus::Cleaned)
    }
}

/// Status of an agent. Terminal statuses are `Completed`, `Failed`, `Killed`, `Lost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentStatus {
    Spawning,
    /// Accepts the legacy alias `idle` on read; always written as `running`.
    #[serde(alias = "idle")]
    Running,
    /// Accepts the legacy alias `exited` on read; always written as `completed`.
    #[serde(alias = "exited")]
    Completed,
    Failed,
    Killed,
    /// Accepts the legacy alias `gone` on read; always written as `lost`.
    #[serde(alias = "gone")]
    Lost,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Killed | AgentStatus::Lost
        )
    }

    /// Accept legacy aliases on read only; never written. Mirrors the
    /// `#[serde(alias = ...)]` attributes above for callers that need to
    /// classify a raw status string outside of deserialization (e.g. logs).
    pub fn from_legacy_alias(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(AgentStatus::Running),
            "exited" => Some(AgentStatus::Completed),
            "gone" => Some(AgentStatus::Lost),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub status: AgentStatus,
    /// Multiplexer pane target (window-or-pane identifier). Identifies a live
    /// location only while the agent is non-terminal.
    pub tmux_target: String,
    /// Prompt text, truncated for storage (see `PROMPT_STORE_TRUNCATE_CHARS`).
    pub prompt: String,
    pub result_file: PathBuf,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worktree {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub status: WorktreeStatus,
    pub tmux_window: String,
    #[serde(default)]
    pub agents: BTreeMap<String, Agent>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

impl Worktree {
    pub fn non_terminal_agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values().filter(|a| !a.status.is_terminal())
    }

    pub fn all_agents_terminal(&self) -> bool {
        self.non_terminal_agents().next().is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub project_root: PathBuf,
    pub session_name: String,
    #[serde(default)]
    pub worktrees: BTreeMap<String, Worktree>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(project_root: PathBuf, session_name: String) -> Self {
        let now = Utc::now();
        Self {
            version: MANIFEST_VERSION,
            project_root,
            session_name,
            worktrees: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn find_agent(&self, agent_id: &str) -> Option<(&Worktree, &Agent)> {
        self.worktrees
            .values()
            .find_map(|wt| wt.agents.get(agent_id).map(|a| (wt, a)))
    }

    pub fn find_agent_mut(&mut self, agent_id: &str) -> Option<&mut Agent> {
        self.worktrees
            .values_mut()
            .find_map(|wt| wt.agents.get_mut(agent_id))
    }

    /// Find a worktree by id or by its human name.
    pub fn find_worktree(&self, name_or_id: &str) -> Option<&Worktree> {
        self.worktrees
            .get(name_or_id)
            .or_else(|| self.worktrees.values().find(|wt| wt.name == name_or_id))
    }

    pub fn find_worktree_mut(&mut self, name_or_id: &str) -> Option<&mut Worktree> {
        if self.worktrees.contains_key(name_or_id) {
            return self.worktrees.get_mut(name_or_id);
        }
        self.worktrees.values_mut().find(|wt| wt.name == name_or_id)
    }

    pub fn worktree_exists(&self, exists_check: &str) -> bool {
        self.worktrees.contains_key(exists_check)
    }

    pub fn agent_exists(&self, agent_id: &str) -> bool {
        self.find_agent(agent_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(WorktreeStatus::Merged.is_terminal());
        assert!(WorktreeStatus::Cleaned.is_terminal());
        assert!(!WorktreeStatus::Active.is_terminal());
        assert!(AgentStatus::Completed.is_terminal());
        assert!(AgentStatus::Lost.is_terminal());
        assert!(!AgentStatus::Running.is_terminal());
    }

    #[test]
    fn legacy_aliases_map_on_read_only() {
        assert_eq!(AgentStatus::from_legacy_alias("idle"), Some(AgentStatus::Running));
        assert_eq!(AgentStatus::from_legacy_alias("exited"), Some(AgentStatus::Completed));
        assert_eq!(AgentStatus::from_legacy_alias("gone"), Some(AgentStatus::Lost));
        assert_eq!(AgentStatus::from_legacy_alias("running"), None);
    }

    #[test]
    fn legacy_status_aliases_deserialize_via_serde() {
        assert_eq!(serde_json::from_str::<AgentStatus>("\"idle\"").unwrap(), AgentStatus::Running);
        assert_eq!(serde_json::from_str::<AgentStatus>("\"exited\"").unwrap(), AgentStatus::Completed);
        assert_eq!(serde_json::from_str::<AgentStatus>("\"gone\"").unwrap(), AgentStatus::Lost);
        assert_eq!(serde_json::from_str::<AgentStatus>("\"running\"").unwrap(), AgentStatus::Running);
    }

    #[test]
    fn agent_status_never_serializes_a_legacy_alias() {
        assert_eq!(serde_json::to_string(&AgentStatus::Running).unwrap(), "\"running\"");
        assert_eq!(serde_json::to_string(&AgentStatus::Completed).unwrap(), "\"completed\"");
        assert_eq!(serde_json::to_string(&AgentStatus::Lost).unwrap(), "\"lost\"");
    }

    #[test]
    fn round_trip_preserves_fields() {
        let manifest = Manifest::new(PathBuf::from("/tmp/proj"), "ppg-proj".into());
        let json = serde_json::to_string(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.project_root, manifest.project_root);
        assert_eq!(back.session_name, manifest.session_name);
        assert_eq!(back.version, manifest.version);
    }
}
