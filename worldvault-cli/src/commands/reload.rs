use super::Target;
use anyhow::{bail, Result};
use colored::Colorize;

pub fn run(target: &Target) -> Result<()> {
    let Some(client) = target.client() else {
        bail!("'reload' talks to a running daemon; pass --server <url>");
    };

    let schedule = client.reload()?;
    println!("{}", "✓ Schedule reloaded".green().bold());
    if schedule.enabled {
        println!(
            "   {}: every {} minute(s)",
            "Schedule".bold(),
            schedule.interval_minutes
        );
    } else {
        println!("   {}: {}", "Schedule".bold(), "disabled".dimmed());
    }
    Ok(())
}
