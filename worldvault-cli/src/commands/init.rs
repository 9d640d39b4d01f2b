use super::Target;
use anyhow::{bail, Result};
use colored::Colorize;
use worldvault_core::VaultConfig;

pub fn run(target: &Target) -> Result<()> {
    if target.client().is_some() {
        bail!("'init' works on the local repository; run it without --server");
    }

    let config_path = target.config_path();
    if VaultConfig::write_default(config_path)? {
        println!(
            "{} {}",
            "✓ Wrote default configuration to".green(),
            config_path.display()
        );
    } else {
        println!("   {}: {}", "Configuration".bold(), config_path.display());
    }

    let orchestrator = target.orchestrator()?;
    let root = orchestrator.init()?;
    let config = orchestrator.config();

    println!("{}", "✓ Snapshot repository ready".green().bold());
    println!("   {}: {}", "Repository".bold(), root.display());
    println!("   {}: {}", "Branch".bold(), config.repository.branch);
    if config.backup.datasets.is_empty() {
        println!();
        println!(
            "{} add dataset names to {} in {}",
            "Next:".yellow().bold(),
            "backup.datasets".cyan(),
            config_path.display()
        );
    } else {
        println!(
            "   {}: {}",
            "Datasets".bold(),
            config.backup.datasets.join(", ")
        );
    }

    Ok(())
}
