//! One file per subcommand (SPEC_FULL.md §6.4): each loads config, calls
//! exactly one `workflow` function, and renders the result as a `tabled`
//! table or, under `--json`, as pretty JSON. No orchestration logic lives
//! here -- it all lives in `workflow`.

pub mod clean;
pub mod init;
pub mod kill;
pub mod merge;
pub mod restart;
pub mod result;
pub mod schedule;
pub mod spawn;
pub mod status;
pub mod wait;

use serde::Serialize;

/// Print `value` as pretty JSON when `json` is set, otherwise invoke `human`
/// (which prints a `tabled` table or whatever plain-text rendering fits).
pub fn render<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}
