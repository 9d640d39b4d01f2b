use super::Target;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use worldvault_server::VaultServer;

pub fn run(target: &Target, bind: Option<String>) -> Result<()> {
    if target.client().is_some() {
        bail!("'serve' starts a daemon; run it without --server");
    }

    let mut config = target.load_config()?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind))?;

    println!("{}", "🚀 Starting worldvault daemon...".bold().cyan());
    println!("   {}: {}", "Repository".bold(), config.repository.path.display());
    println!("   {}: {}", "Datasets".bold(), config.backup.datasets.join(", "));
    match config.interval() {
        Some(_) => println!(
            "   {}: every {} minute(s)",
            "Schedule".bold(),
            config.backup.interval_minutes
        ),
        None => println!("   {}: {}", "Schedule".bold(), "disabled".dimmed()),
    }
    println!(
        "   {}: {}",
        "API Server".bold(),
        format!("http://{}", addr).green()
    );
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let config_path = target.config_path().to_path_buf();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let mut server = VaultServer::new(config)?;
        if config_path.exists() {
            server = server.with_config_path(config_path);
        }
        server.serve(addr).await
    })
}
