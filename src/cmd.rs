//! Typed wrapper around child processes, used for every git/tmux/shell
//! invocation in the crate.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::process::{Command, Output};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// A builder for executing shell commands with unified error handling.
///
/// Distinguishes a spawn failure (executable missing, permission denied --
/// `.output()` itself returns `Err`) from a completed process that exited
/// nonzero (captured in the `Err` returned by `run`, carrying stderr).
pub struct Cmd<'a> {
    command: &'a str,
    args: Vec<&'a str>,
    workdir: Option<&'a Path>,
}

impl<'a> Cmd<'a> {
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            args: Vec::new(),
            workdir: None,
        }
    }

    pub fn arg(mut self, arg: &'a str) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: &[&'a str]) -> Self {
        self.args.extend_from_slice(args);
        self
    }

    pub fn workdir(mut self, path: &'a Path) -> Self {
        self.workdir = Some(path);
        self
    }

    fn spawn_and_wait(&self) -> Result<Output> {
        let workdir_display = self.workdir.map(|p| p.display().to_string());
        trace!(command = self.command, args = ?self.args, workdir = ?workdir_display, "cmd:spawn");

        let mut cmd = Command::new(self.command);
        if let Some(dir) = self.workdir {
            cmd.current_dir(dir);
        }
        cmd.env("PATH", augmented_path());
        cmd.args(&self.args).output().with_context(|| {
            format!(
                "Failed to spawn command: {} {}",
                self.command,
                self.args.join(" ")
            )
        })
    }

    /// Execute the command and return the output. Returns an error if the
    /// command fails to spawn or exits nonzero.
    pub fn run(self) -> Result<Output> {
        let output = self.spawn_and_wait()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                command = self.command,
                args = ?self.args,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:run failure"
            );
            return Err(anyhow!(
                "Command failed: {} {}\n{}",
                self.command,
                self.args.join(" "),
                stderr.trim()
            ));
        }
        trace!(command = self.command, "cmd:run success");
        Ok(output)
    }

    /// Execute the command and return stdout as a trimmed string.
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Execute the command, returning `Ok(true)`/`Ok(false)` on success/nonzero
    /// exit. A spawn failure still surfaces as `Err`.
    pub fn run_as_check(self) -> Result<bool> {
        let output = self.spawn_and_wait()?;
        let success = output.status.success();
        trace!(command = self.command, success, "cmd:check result");
        Ok(success)
    }
}

static AUGMENTED_PATH: OnceLock<String> = OnceLock::new();

/// `PATH`, augmented with common package-install bin directories, queried
/// once per process and cached. Agents launched from a pane whose shell
/// initialization differs from the orchestrator's own environment (login
/// shells loading `nvm`/`volta` shims) still resolve correctly.
pub fn augmented_path() -> &'static str {
    AUGMENTED_PATH.get_or_init(|| {
        let mut entries: Vec<String> = std::env::var("PATH")
            .map(|p| p.split(':').map(String::from).collect())
            .unwrap_or_default();

        if let Some(home) = home::home_dir() {
            for extra in [".local/bin", ".cargo/bin"] {
                entries.push(home.join(extra).display().to_string());
            }
        }
        entries.push("/opt/homebrew/bin".to_string());

        entries.join(":")
    })
}

/// Resolve an executable name to an absolute path, searching the augmented
/// `PATH` (see `augmented_path`) rather than only the orchestrator's own.
pub fn resolve_executable(name: &str) -> Result<std::path::PathBuf> {
    let path_var = augmented_path();
    which::which_in(name, Some(path_var), std::env::current_dir()?)
        .with_context(|| format!("Executable not found on PATH: {name}"))
}

/// Escape a string for interpolation into a double-quoted `sh -c "..."`
/// argument: backslash, double-quote, dollar, and backtick must each be
/// backslash-escaped so the shell doesn't reinterpret them.
pub fn shell_quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failure_is_distinct_from_nonzero_exit() {
        let spawn_err = Cmd::new("definitely-not-a-real-binary-xyz").run();
        assert!(spawn_err.is_err());

        let nonzero = Cmd::new("false").run();
        assert!(nonzero.is_err());
        assert!(nonzero.unwrap_err().to_string().contains("Command failed"));
    }

    #[test]
    fn run_as_check_reflects_exit_status() {
        assert!(Cmd::new("true").run_as_check().unwrap());
        assert!(!Cmd::new("false").run_as_check().unwrap());
    }

    #[test]
    fn run_and_capture_stdout_trims_output() {
        let out = Cmd::new("echo").arg("hello").run_and_capture_stdout().unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn spawned_commands_see_the_augmented_path() {
        let out = Cmd::new("sh").args(&["-c", "echo $PATH"]).run_and_capture_stdout().unwrap();
        assert_eq!(out, augmented_path());
    }

    #[test]
    fn augmented_path_includes_original_path() {
        let original = std::env::var("PATH").unwrap_or_default();
        let augmented = augmented_path();
        if let Some(first) = original.split(':').next() {
            assert!(augmented.contains(first));
        }
    }

    #[test]
    fn shell_quote_escapes_special_characters() {
        assert_eq!(shell_quote(r#"a"b"#), r#"a\"b"#);
        assert_eq!(shell_quote("a$b`c\\d"), r"a\$b\`c\\d");
        assert_eq!(shell_quote("plain"), "plain");
    }
}
