use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use worldvault_core::config::DEFAULT_CONFIG_FILE;

mod commands;
mod display;

use commands::{diff, init, list, now, reload, restore, serve, status, Target};

#[derive(Parser)]
#[command(name = "worldvault")]
#[command(version, about = "Versioned git snapshots of live world directories", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// URL of a running daemon; when set, commands go through its API
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configuration file and the snapshot repository
    Init,

    /// Take a snapshot now
    Now {
        /// Snapshot message (defaults to "manual backup")
        message: Vec<String>,
    },

    /// List snapshots, newest first
    List {
        /// Page number, 10 snapshots per page
        #[arg(default_value = "1")]
        page: usize,
    },

    /// Restore the live datasets from a snapshot
    Restore {
        /// Snapshot ID (full or abbreviated)
        snapshot_id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show repository and scheduler status
    Status,

    /// Show files changed by a snapshot, or between two snapshots
    Diff {
        /// Snapshot ID
        snapshot_id: String,

        /// Snapshot to compare against (defaults to the parent)
        other: Option<String>,
    },

    /// Make a running daemon re-read its backup interval (requires --server)
    Reload,

    /// Run the daemon: scheduled backups plus the HTTP API
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let target = Target::new(cli.config, cli.server);

    match cli.command {
        Commands::Init => {
            init::run(&target)?;
        }
        Commands::Now { message } => {
            now::run(&target, message)?;
        }
        Commands::List { page } => {
            list::run(&target, page)?;
        }
        Commands::Restore { snapshot_id, yes } => {
            restore::run(&target, &snapshot_id, yes)?;
        }
        Commands::Status => {
            status::run(&target)?;
        }
        Commands::Diff { snapshot_id, other } => {
            diff::run(&target, &snapshot_id, other.as_deref())?;
        }
        Commands::Reload => {
            reload::run(&target)?;
        }
        Commands::Serve { bind } => {
            serve::run(&target, bind)?;
        }
    }

    Ok(())
}
