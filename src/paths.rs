//! Deterministic filesystem layout and ID minting.

use std::path::{Path, PathBuf};

use getrandom::fill;

/// Directory name, under the project root, that holds all orchestration state.
pub const STATE_DIR_NAME: &str = ".ppg";

/// Directory name, sibling to the state dir, that holds worktree checkouts.
pub const WORKTREES_DIR_NAME: &str = ".worktrees";

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Centralizes every path derived from a project root so no other module
/// string-concatenates `.ppg/` by hand.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir().join("manifest.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("manifest.json.lock")
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config.yaml")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.state_dir().join("templates")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.state_dir().join("prompts")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.state_dir().join("results")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn schedules_path(&self) -> PathBuf {
        self.state_dir().join("schedules.yaml")
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.root.join(WORKTREES_DIR_NAME)
    }

    pub fn worktree_path(&self, worktree_id: &str) -> PathBuf {
        self.worktrees_dir().join(worktree_id)
    }

    pub fn prompt_path(&self, agent_id: &str) -> PathBuf {
        self.prompts_dir().join(format!("{agent_id}.md"))
    }

    pub fn result_path(&self, agent_id: &str) -> PathBuf {
        self.results_dir().join(format!("{agent_id}.md"))
    }

    /// All directories that must exist for the project to be considered initialized.
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.state_dir(),
            self.templates_dir(),
            self.prompts_dir(),
            self.results_dir(),
            self.logs_dir(),
            self.worktrees_dir(),
        ]
    }
}

/// Mint a random lowercase-alphanumeric id of the given length.
fn mint_id(len: usize) -> String {
    let mut buf = vec![0u8; len];
    fill(&mut buf).expect("failed to read system randomness");
    buf.iter()
        .map(|b| ID_ALPHABET[(*b as usize) % ID_ALPHABET.len()] as char)
        .collect()
}

/// Mint a worktree id (`wt-` + 6 lowercase alphanumerics), retrying on collision
/// against `exists`.
pub fn mint_worktree_id(mut exists: impl FnMut(&str) -> bool) -> String {
    loop {
        let candidate = format!("wt-{}", mint_id(6));
        if !exists(&candidate) {
            return candidate;
        }
    }
}

/// Mint an agent id (`ag-` + 8 lowercase alphanumerics), retrying on collision
/// against `exists`.
pub fn mint_agent_id(mut exists: impl FnMut(&str) -> bool) -> String {
    loop {
        let candidate = format!("ag-{}", mint_id(8));
        if !exists(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worktree_id_has_expected_shape() {
        let id = mint_worktree_id(|_| false);
        assert!(id.starts_with("wt-"));
        assert_eq!(id.len(), "wt-".len() + 6);
        assert!(
            id["wt-".len()..]
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn agent_id_has_expected_shape() {
        let id = mint_agent_id(|_| false);
        assert!(id.starts_with("ag-"));
        assert_eq!(id.len(), "ag-".len() + 8);
    }

    #[test]
    fn mint_retries_on_collision() {
        let mut calls = 0;
        let id = mint_worktree_id(|_| {
            calls += 1;
            calls <= 2
        });
        assert_eq!(calls, 3);
        assert!(id.starts_with("wt-"));
    }

    #[test]
    fn paths_are_rooted_under_project() {
        let paths = Paths::new("/tmp/proj");
        assert_eq!(paths.manifest_path(), Path::new("/tmp/proj/.ppg/manifest.json"));
        assert_eq!(paths.lock_path(), Path::new("/tmp/proj/.ppg/manifest.json.lock"));
        assert_eq!(paths.worktree_path("wt-abc123"), Path::new("/tmp/proj/.worktrees/wt-abc123"));
        assert_eq!(paths.prompt_path("ag-deadbeef"), Path::new("/tmp/proj/.ppg/prompts/ag-deadbeef.md"));
    }
}
