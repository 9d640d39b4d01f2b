use std::fs;
use worldvault::core::{BackupOutcome, RestoreStatus};
use worldvault::{SnapshotOrchestrator, VaultConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("worldvault_core=info"))
        .init();

    println!("🌍 Embedded example - snapshotting a world directory\n");

    let workspace = tempfile::tempdir()?;
    let server_root = workspace.path().join("server");
    fs::create_dir_all(server_root.join("world/region"))?;
    fs::write(server_root.join("world/level.dat"), "seed=42")?;
    fs::write(server_root.join("world/region/r.0.0.mca"), "chunk data")?;

    let mut config = VaultConfig::default();
    config.repository.path = workspace.path().join("backups");
    config.source.root = server_root.clone();
    config.backup.datasets = vec!["world".to_string()];
    config.backup.max_snapshots = 5;

    let orchestrator = SnapshotOrchestrator::from_config(config)?;
    println!("✓ Repository ready at {}", orchestrator.init()?.display());
    println!();

    println!("💾 Taking the first snapshot...");
    let first = orchestrator.run_backup("first snapshot")?;
    let first_id = match &first.outcome {
        BackupOutcome::NoChanges => anyhow::bail!("expected a snapshot"),
        BackupOutcome::Committed { snapshot }
        | BackupOutcome::CommittedPushFailed { snapshot, .. } => snapshot.id.clone(),
    };
    println!("✓ Snapshot created: {}", first_id);
    println!();

    println!("📝 The world changes...");
    fs::write(server_root.join("world/level.dat"), "seed=42\ntime=6000")?;
    let second = orchestrator.run_backup("after a day")?;
    println!(
        "✓ Snapshot created: {}",
        second.snapshot_id().unwrap_or("none")
    );
    println!();

    println!("📜 History:");
    for snapshot in orchestrator.history()? {
        println!("  {} {}", snapshot.short_id(), snapshot.summary());
    }
    println!();

    println!("⏪ Restoring the first snapshot...");
    let restore = orchestrator.run_restore(&first_id)?;
    match restore.status {
        RestoreStatus::Success => println!("✓ Restore complete"),
        RestoreStatus::Partial => println!("⚠ Restore partially complete"),
        RestoreStatus::Failed => println!("✗ Restore failed"),
    }
    println!(
        "  level.dat: {:?}",
        fs::read_to_string(server_root.join("world/level.dat"))?
    );
    println!(
        "  previous data kept in: {}",
        server_root.join("world.pre-restore").display()
    );

    orchestrator.close()?;
    Ok(())
}
