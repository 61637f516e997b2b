//! Pure variable-substitution templating for prompt files.
//!
//! Deliberately not a Jinja engine: placeholders are `{{VAR}}` tokens
//! substituted verbatim against a variable map. No conditionals, loops, or
//! filters -- a read-at-startup/render-at-spawn-time helper, not a language.

use std::collections::BTreeMap;

/// Built-in template variables every spawn supplies.
pub const WORKTREE_PATH: &str = "WORKTREE_PATH";
pub const BRANCH: &str = "BRANCH";
pub const AGENT_ID: &str = "AGENT_ID";
pub const RESULT_FILE: &str = "RESULT_FILE";
pub const PROJECT_ROOT: &str = "PROJECT_ROOT";
pub const TASK_NAME: &str = "TASK_NAME";
pub const PROMPT: &str = "PROMPT";

/// Render `template`, replacing every `{{VAR}}` occurrence found in `vars`.
/// Placeholders with no matching variable are left untouched in the output,
/// mirroring the teacher's tolerant-by-default approach to optional fields.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(end) = template[i + 2..].find("}}") {
                let name = template[i + 2..i + 2 + end].trim();
                if let Some(value) = vars.get(name) {
                    out.push_str(value);
                } else {
                    out.push_str(&template[i..i + 2 + end + 2]);
                }
                i += 2 + end + 2;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Truncate `text` to at most `max_chars` characters (char-boundary safe),
/// used when persisting prompt text into the manifest.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_known_variables() {
        let out = render("cd {{WORKTREE_PATH}} && run", &vars(&[("WORKTREE_PATH", "/tmp/wt")]));
        assert_eq!(out, "cd /tmp/wt && run");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let out = render("{{UNKNOWN}}", &vars(&[]));
        assert_eq!(out, "{{UNKNOWN}}");
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        let out = render("{{ BRANCH }}", &vars(&[("BRANCH", "ppg/t1")]));
        assert_eq!(out, "ppg/t1");
    }

    #[test]
    fn handles_multiple_occurrences() {
        let out = render("{{A}}-{{A}}", &vars(&[("A", "x")]));
        assert_eq!(out, "x-x");
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        let truncated = truncate_chars("héllo wörld", 3);
        assert_eq!(truncated.chars().count(), 3);
    }

    #[test]
    fn truncate_chars_noop_when_short_enough() {
        assert_eq!(truncate_chars("short", 500), "short");
    }
}
