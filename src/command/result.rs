use std::path::Path;

use anyhow::Result;

use crate::multiplexer::TmuxMultiplexer;
use crate::paths::Paths;
use crate::result as result_mod;
use crate::workflow;

pub fn run(project_root: &Path, worktree: Option<&str>, all: bool, out: Option<&Path>, json: bool) -> Result<()> {
    let paths = Paths::new(project_root.to_path_buf());
    let mux = TmuxMultiplexer::new();
    let filter = if all { None } else { worktree };

    let results = workflow::collect_results(&paths, filter, Some(&mux))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let rendered = result_mod::render_markdown(&results);
    match result_mod::write_or_return(rendered, out)? {
        Some(text) => println!("{text}"),
        None => println!("Wrote results to {}", out.expect("out_path given").display()),
    }
    Ok(())
}
