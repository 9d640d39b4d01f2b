use chrono::{DateTime, Utc};
use colored::Colorize;
use worldvault_core::{
    BackupOutcome, BackupResult, ChangeType, DatasetRestore, HistoryPage, RestoreResult,
    RestoreStatus, SnapshotRecord,
};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn snapshot_line(index: usize, snapshot: &SnapshotRecord) -> String {
    format!(
        "{:>3}. {} {} {} {}",
        index,
        snapshot.short_id().yellow(),
        snapshot.timestamp.format(DATE_FORMAT).to_string().dimmed(),
        format!("<{}>", snapshot.author_name).dimmed(),
        snapshot.summary()
    )
}

pub fn history_page(page: &HistoryPage) {
    if page.entries.is_empty() {
        println!("{}", "No snapshots yet".yellow());
        return;
    }

    println!(
        "{} {}",
        "Snapshots".bold().cyan(),
        format!("(page {}/{}, {} total)", page.page, page.total_pages, page.total).dimmed()
    );
    println!();
    for (offset, snapshot) in page.entries.iter().enumerate() {
        println!("{}", snapshot_line(page.first_index + offset, snapshot));
    }

    if page.has_next() {
        println!();
        println!(
            "Use {} to see more",
            format!("worldvault list {}", page.page + 1).cyan()
        );
    }
}

pub fn backup_result(result: &BackupResult) {
    match &result.outcome {
        BackupOutcome::NoChanges => {
            println!("{}", "No changes detected, no snapshot created".yellow());
        }
        BackupOutcome::Committed { snapshot } => {
            println!("{}", "✓ Snapshot created".green().bold());
            snapshot_details(snapshot);
        }
        BackupOutcome::CommittedPushFailed {
            snapshot,
            push_error,
        } => {
            println!("{}", "✓ Snapshot created".green().bold());
            snapshot_details(snapshot);
            println!("  {}: {}", "Push failed".red().bold(), push_error);
        }
    }

    if result.sync.files() > 0 {
        println!(
            "  {}: {} file(s), {} byte(s) in {} dataset(s)",
            "Copied".bold(),
            result.sync.files(),
            result.sync.bytes(),
            result.sync.mirrored.len()
        );
    }
    for skipped in &result.sync.skipped {
        println!(
            "  {} {} ({})",
            "skipped".yellow(),
            skipped.name,
            skipped.reason
        );
    }
    if let Some(warning) = &result.flush_warning {
        println!("  {}: {}", "Flush warning".yellow().bold(), warning);
    }
    if let Some(prune) = result.prune.as_ref().filter(|p| p.removed > 0) {
        println!(
            "  {}: removed {} old snapshot(s), {} kept",
            "Retention".bold(),
            prune.removed,
            prune.retained
        );
    }
    if let Some(error) = &result.prune_error {
        println!("  {}: {}", "Pruning failed".red().bold(), error);
    }
}

fn snapshot_details(snapshot: &SnapshotRecord) {
    println!("  {}: {}", "Snapshot ID".bold(), snapshot.id);
    println!("  {}: {}", "Message".bold(), snapshot.summary());
    println!(
        "  {}: {}",
        "Date".bold(),
        snapshot.timestamp.format(DATE_FORMAT)
    );
}

pub fn restore_result(result: &RestoreResult) {
    let headline = match result.status {
        RestoreStatus::Success => "✓ Restore complete".green().bold(),
        RestoreStatus::Partial => "⚠ Restore partially complete".yellow().bold(),
        RestoreStatus::Failed => "✗ Restore failed".red().bold(),
    };
    println!("{}", headline);
    println!(
        "  {}: {} {}",
        "Snapshot".bold(),
        result.snapshot.short_id().yellow(),
        result.snapshot.summary()
    );
    println!();

    for dataset in &result.datasets {
        match dataset {
            DatasetRestore::Restored { name, safety_copy } => {
                print!("  {} {}", "✓".green(), name);
                if let Some(path) = safety_copy {
                    print!(" {}", format!("(previous data in {})", path.display()).dimmed());
                }
                println!();
            }
            DatasetRestore::Skipped { name, reason } => {
                println!("  {} {} - {}", "-".yellow(), name, reason);
            }
            DatasetRestore::Failed { name, error } => {
                println!("  {} {} - {}", "✗".red(), name, error);
            }
            DatasetRestore::NotAttempted { name } => {
                println!("  {} {} - {}", "·".dimmed(), name, "not attempted".dimmed());
            }
        }
    }
}

/// Rough age such as "5 minutes ago".
pub fn age(timestamp: DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(timestamp);
    let (amount, unit) = if elapsed.num_days() > 0 {
        (elapsed.num_days(), "day")
    } else if elapsed.num_hours() > 0 {
        (elapsed.num_hours(), "hour")
    } else if elapsed.num_minutes() > 0 {
        (elapsed.num_minutes(), "minute")
    } else {
        return "just now".to_string();
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("{} {}{} ago", amount, unit, plural)
}

pub fn change_icon(change_type: ChangeType) -> colored::ColoredString {
    match change_type {
        ChangeType::Create => "+".green(),
        ChangeType::Modify => "~".yellow(),
        ChangeType::Delete => "-".red(),
        ChangeType::Rename => "→".blue(),
    }
}
