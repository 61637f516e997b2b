//! The project state document: one JSON file per project, guarded by a
//! sidecar lock file for structural mutations.

pub mod store;
pub mod types;

pub use store::{init, read, update};
pub use types::{Agent, AgentStatus, Manifest, Worktree, WorktreeStatus};

/// Truncation length for prompts stored in the manifest (open question
/// resolved as a compile-time constant; the config schema names no field
/// for it).
pub const PROMPT_STORE_TRUNCATE_CHARS: usize = 500;

pub fn truncate_prompt_for_storage(prompt: &str) -> String {
    if prompt.chars().count() <= PROMPT_STORE_TRUNCATE_CHARS {
        return prompt.to_string();
    }
    let truncated: String = prompt.chars().take(PROMPT_STORE_TRUNCATE_CHARS).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompts_are_untouched() {
        assert_eq!(truncate_prompt_for_storage("hello"), "hello");
    }

    #[test]
    fn long_prompts_are_truncated_with_ellipsis() {
        let long = "a".repeat(600);
        let truncated = truncate_prompt_for_storage(&long);
        assert_eq!(truncated.chars().count(), PROMPT_STORE_TRUNCATE_CHARS + 3);
        assert!(truncated.ends_with("..."));
    }
}
