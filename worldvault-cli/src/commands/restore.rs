use super::Target;
use crate::display;
use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub fn run(target: &Target, snapshot_id: &str, yes: bool) -> Result<()> {
    if !yes {
        println!("{}", "Restore Preview".bold().cyan());
        println!("  {}: {}", "Target Snapshot".bold(), snapshot_id);
        println!(
            "  Live datasets will be replaced. The current data is kept in {} directories.",
            "<name>.pre-restore".cyan()
        );
        println!();

        let confirmed = Confirm::new()
            .with_prompt("Restore this snapshot now?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Restore cancelled".yellow());
            return Ok(());
        }
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!("Restoring {}", snapshot_id));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = match target.client() {
        Some(client) => client.restore(snapshot_id),
        None => target
            .orchestrator()
            .and_then(|orchestrator| Ok(orchestrator.run_restore(snapshot_id)?)),
    };
    spinner.finish_and_clear();

    display::restore_result(&result?);
    Ok(())
}
