use super::Target;
use crate::display;
use anyhow::{bail, Result};
use colored::Colorize;

pub fn run(target: &Target, snapshot_id: &str, other: Option<&str>) -> Result<()> {
    if target.client().is_some() {
        bail!("'diff' reads the local repository; run it without --server");
    }

    let changes = target.orchestrator()?.diff(snapshot_id, other)?;

    match other {
        Some(other) => println!(
            "{} {} {} {}",
            "Changes from".bold().cyan(),
            snapshot_id.yellow(),
            "to".bold().cyan(),
            other.yellow()
        ),
        None => println!(
            "{} {}",
            "Changes in".bold().cyan(),
            snapshot_id.yellow()
        ),
    }
    println!();

    if changes.is_empty() {
        println!("{}", "No file changes".green());
        return Ok(());
    }

    for change in &changes.changes {
        match &change.old_path {
            Some(old_path) => println!(
                "  {} {} {} {}",
                display::change_icon(change.change_type),
                old_path.display(),
                "→".dimmed(),
                change.path.display()
            ),
            None => println!(
                "  {} {}",
                display::change_icon(change.change_type),
                change.path.display()
            ),
        }
    }

    println!();
    println!(
        "{} file(s) changed in {}",
        changes.len().to_string().cyan(),
        changes.datasets().join(", ")
    );
    Ok(())
}
