use std::path::Path;

use anyhow::Result;

use crate::workflow;

pub fn run(project_root: &Path) -> Result<()> {
    workflow::init(project_root)?;
    println!("Initialized ppg project at {}", project_root.display());
    Ok(())
}
