use super::Target;
use crate::display;
use anyhow::Result;
use colored::Colorize;
use worldvault_core::{OrchestratorStatus, RunPhase};

pub fn run(target: &Target) -> Result<()> {
    if let Some(client) = target.client() {
        let status = client.status()?;
        println!("{}", "Daemon Status".bold().cyan());
        println!("  {}: {}", "Server".bold(), client.base_url());
        print_run_status(&status);
        let schedule = client.schedule()?;
        if schedule.enabled {
            println!(
                "  {}: every {} minute(s)",
                "Schedule".bold(),
                schedule.interval_minutes
            );
        } else {
            println!("  {}: {}", "Schedule".bold(), "disabled".dimmed());
        }
        return Ok(());
    }

    let orchestrator = target.orchestrator()?;
    let config = orchestrator.config();

    println!("{}", "Vault Status".bold().cyan());
    println!("  {}: {}", "Repository".bold(), config.repository.path.display());
    println!("  {}: {}", "Branch".bold(), config.repository.branch);
    let remote = if config.repository.remote_url.is_empty() {
        "none".dimmed().to_string()
    } else {
        config.repository.remote_url.clone()
    };
    println!("  {}: {}", "Remote".bold(), remote);
    let schedule = match config.interval() {
        Some(_) => format!("every {} minute(s)", config.backup.interval_minutes),
        None => "disabled".dimmed().to_string(),
    };
    println!("  {}: {}", "Schedule".bold(), schedule);
    let retention = match config.retention().limit() {
        Some(limit) => format!("keep {} snapshot(s)", limit),
        None => "unlimited".to_string(),
    };
    println!("  {}: {}", "Retention".bold(), retention);
    println!();

    let live = orchestrator.live_datasets().unwrap_or_default();
    println!("{}", "Datasets:".bold());
    if config.backup.datasets.is_empty() {
        println!("  {}", "none configured".yellow());
    }
    for name in &config.backup.datasets {
        let state = if live.contains(name) {
            "live".green()
        } else {
            "missing".red()
        };
        println!("  {} {}", name, state);
    }
    println!();

    let page = orchestrator.history_page(1)?;
    println!(
        "{} {}",
        "Snapshots:".bold(),
        page.total.to_string().yellow()
    );
    if let Some(latest) = page.entries.first() {
        println!("{}", display::snapshot_line(1, latest));
        println!("     {}", display::age(latest.timestamp).dimmed());
    }

    Ok(())
}

fn print_run_status(status: &OrchestratorStatus) {
    let phase = match status.phase {
        RunPhase::Idle => status.phase.to_string().green(),
        RunPhase::Aborted => status.phase.to_string().red(),
        _ => status.phase.to_string().yellow(),
    };
    println!("  {}: {}", "Phase".bold(), phase);
    println!(
        "  {}: {}",
        "Busy".bold(),
        if status.busy { "yes".yellow() } else { "no".green() }
    );

    if let Some(run) = &status.last_run {
        let outcome = if run.succeeded {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {}: {} {:?} {} - {}",
            "Last run".bold(),
            outcome,
            run.kind,
            display::age(run.finished_at).dimmed(),
            run.detail
        );
    }
}
