//! Layered configuration loading for the orchestration core.
//!
//! A single project-scoped YAML document (`.ppg/config.yaml`) is read via
//! `serde_yaml`; any field it omits falls back to a code-level default via
//! `#[serde(default)]`, matching the teacher's project/global merge except
//! that no separate global `~/.config` layer is specified for this crate.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::paths::Paths;

/// Prompts are stored truncated to this many characters (source uses ~500;
/// treated here as a compile-time constant, not a config field).
pub const PROMPT_STORE_TRUNCATE_CHARS: usize = 500;

/// Default branch-name prefix (`<prefix>/<worktree-name>`).
pub const DEFAULT_BRANCH_PREFIX: &str = "ppg";

/// A single configured agent type: a data-driven strategy, not a trait
/// hierarchy (see SPEC_FULL.md's "dynamic dispatch over agent types" note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub prompt_flag: Option<String>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub result_instructions: Option<String>,
}

fn default_agents() -> BTreeMap<String, AgentConfig> {
    let mut agents = BTreeMap::new();
    agents.insert(
        "claude".to_string(),
        AgentConfig {
            name: "claude".to_string(),
            command: "claude".to_string(),
            prompt_flag: None,
            interactive: true,
            result_instructions: None,
        },
    );
    agents
}

fn default_branch_prefix() -> String {
    DEFAULT_BRANCH_PREFIX.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub default_agent: Option<String>,
    #[serde(default = "default_agents")]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default)]
    pub worktree_base: Option<String>,
    #[serde(default)]
    pub template_dir: Option<String>,
    #[serde(default)]
    pub result_dir: Option<String>,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub env_files: Vec<String>,
    #[serde(default)]
    pub symlink_node_modules: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_name: None,
            default_agent: None,
            agents: default_agents(),
            branch_prefix: default_branch_prefix(),
            worktree_base: None,
            template_dir: None,
            result_dir: None,
            log_dir: None,
            env_files: Vec::new(),
            symlink_node_modules: None,
        }
    }
}

impl Config {
    /// Load `.ppg/config.yaml`, layering code defaults under whatever the
    /// document provides (or returning pure defaults if the file is absent).
    pub fn load(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_path();
        if !config_path.exists() {
            return Ok(Self::default_for_project(paths));
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config at {}", config_path.display()))?;
        let mut config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", config_path.display()))?;

        if config.session_name.is_none() {
            config.session_name = Some(Self::derive_session_name(paths.project_root()));
        }
        Ok(config)
    }

    /// Defaults applied before any config document exists, e.g. during `init`.
    fn default_for_project(paths: &Paths) -> Self {
        let mut config = Self::default();
        config.session_name = Some(Self::derive_session_name(paths.project_root()));
        config.symlink_node_modules = Some(paths.project_root().join("node_modules").is_dir());
        config
    }

    fn derive_session_name(project_root: &Path) -> String {
        let base = project_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "ppg".to_string());
        format!("ppg-{base}")
    }

    pub fn agent(&self, key: &str) -> Option<&AgentConfig> {
        self.agents.get(key)
    }

    pub fn default_agent_key(&self) -> &str {
        self.default_agent
            .as_deref()
            .unwrap_or_else(|| self.agents.keys().next().map(|s| s.as_str()).unwrap_or("claude"))
    }

    pub fn resolve_agent(&self, key: Option<&str>) -> Result<&AgentConfig> {
        let key = key.unwrap_or_else(|| self.default_agent_key());
        self.agent(key)
            .with_context(|| format!("No agent configured with name '{key}'"))
    }

    pub fn symlink_node_modules(&self) -> bool {
        self.symlink_node_modules.unwrap_or(false)
    }

    /// Write an example config document for `ppg init`.
    pub fn write_example(paths: &Paths) -> Result<()> {
        let config_path = paths.config_path();
        if config_path.exists() {
            return Ok(());
        }
        let example = r#"# ppg project configuration
sessionName: null       # defaults to "ppg-<directory name>"
defaultAgent: claude
branchPrefix: ppg
worktreeBase: null       # defaults to the sibling .worktrees/ directory
envFiles: []             # files to copy into every new worktree, e.g. [.env]
symlinkNodeModules: null # defaults to true only when ./node_modules exists
agents:
  claude:
    command: claude
    interactive: true
"#;
        fs::write(&config_path, example)
            .with_context(|| format!("Failed to write config at {}", config_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().to_path_buf());
        let config = Config::load(&paths).unwrap();
        assert!(config.session_name.unwrap().starts_with("ppg-"));
        assert_eq!(config.branch_prefix, "ppg");
        assert!(config.agent("claude").is_some());
    }

    #[test]
    fn symlink_node_modules_infers_from_presence() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        let paths = Paths::new(dir.path().to_path_buf());
        let config = Config::load(&paths).unwrap();
        assert!(config.symlink_node_modules());
    }

    #[test]
    fn explicit_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().to_path_buf());
        fs::create_dir_all(paths.state_dir()).unwrap();
        fs::write(
            paths.config_path(),
            "branchPrefix: feature\ndefaultAgent: codex\nagents:\n  codex:\n    command: codex\n    interactive: false\n",
        )
        .unwrap();

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.branch_prefix, "feature");
        assert_eq!(config.default_agent_key(), "codex");
        assert!(!config.agent("codex").unwrap().interactive);
    }

    #[test]
    fn resolve_agent_errors_on_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().to_path_buf());
        let config = Config::load(&paths).unwrap();
        assert!(config.resolve_agent(Some("nonexistent")).is_err());
    }
}
