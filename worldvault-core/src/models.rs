use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// An immutable snapshot on the backup branch, identified by its commit id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub parent_id: Option<String>,
}

impl SnapshotRecord {
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(8);
        &self.id[..end]
    }

    /// First line of the message, as shown in listings.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// One page of snapshot history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
    /// 1-based position of the first entry within the whole history.
    pub first_index: usize,
    pub entries: Vec<SnapshotRecord>,
}

impl HistoryPage {
    pub const DEFAULT_PER_PAGE: usize = 10;

    /// Pages below 1 are treated as 1 and pages past the end as the last page.
    pub fn paginate(history: Vec<SnapshotRecord>, page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total = history.len();
        let total_pages = total.div_ceil(per_page);
        let page = page.clamp(1, total_pages.max(1));
        let start = (page - 1) * per_page;
        let entries: Vec<SnapshotRecord> = history.into_iter().skip(start).take(per_page).collect();

        Self {
            page,
            total_pages,
            total,
            first_index: start + 1,
            entries,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A live dataset and the tracked subdirectory it is mirrored into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedDataset {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl TrackedDataset {
    pub fn new(name: impl Into<String>, source: PathBuf, destination: PathBuf) -> Self {
        Self {
            name: name.into(),
            source,
            destination,
        }
    }

    /// Sibling of the live directory that receives the pre-restore copy.
    pub fn safety_path(&self) -> PathBuf {
        let mut file_name = self
            .source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| self.name.clone().into());
        file_name.push(".pre-restore");
        self.source.with_file_name(file_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Zero or negative means unlimited.
    pub max_snapshots: i64,
}

impl RetentionPolicy {
    pub fn new(max_snapshots: i64) -> Self {
        Self { max_snapshots }
    }

    pub fn unlimited() -> Self {
        Self { max_snapshots: 0 }
    }

    pub fn limit(&self) -> Option<usize> {
        if self.max_snapshots <= 0 {
            None
        } else {
            Some(self.max_snapshots as usize)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The data source does not know the dataset.
    Unresolved,
    /// The live directory is missing.
    SourceMissing,
    /// The snapshot has no directory for the dataset.
    NotInSnapshot,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Unresolved => "not known to the data source",
            SkipReason::SourceMissing => "live directory is missing",
            SkipReason::NotInSnapshot => "not present in the snapshot",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDataset {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredDataset {
    pub name: String,
    pub files: u64,
    pub bytes: u64,
    /// Symlinks, special files and nested repositories left out of the copy.
    pub skipped_entries: Vec<PathBuf>,
    pub safety_copy: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub mirrored: Vec<MirroredDataset>,
    pub skipped: Vec<SkippedDataset>,
}

impl SyncReport {
    pub fn skip(&mut self, name: impl Into<String>, reason: SkipReason) {
        self.skipped.push(SkippedDataset {
            name: name.into(),
            reason,
        });
    }

    pub fn files(&self) -> u64 {
        self.mirrored.iter().map(|m| m.files).sum()
    }

    pub fn bytes(&self) -> u64 {
        self.mirrored.iter().map(|m| m.bytes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub removed: usize,
    pub retained: usize,
    /// Branch tip after history was rewritten.
    pub new_tip: Option<String>,
    pub objects_deleted: usize,
}

impl PruneReport {
    pub fn nothing(retained: usize) -> Self {
        Self {
            removed: 0,
            retained,
            new_tip: None,
            objects_deleted: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Backup,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Acquiring,
    Quiescing,
    Synchronizing,
    Staging,
    Committing,
    Pushing,
    Pruning,
    CheckingOut,
    Restoring,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunPhase::Idle => "idle",
            RunPhase::Acquiring => "acquiring",
            RunPhase::Quiescing => "quiescing",
            RunPhase::Synchronizing => "synchronizing",
            RunPhase::Staging => "staging",
            RunPhase::Committing => "committing",
            RunPhase::Pushing => "pushing",
            RunPhase::Pruning => "pruning",
            RunPhase::CheckingOut => "checking out",
            RunPhase::Restoring => "restoring",
            RunPhase::Aborted => "aborted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupOutcome {
    NoChanges,
    Committed {
        snapshot: SnapshotRecord,
    },
    CommittedPushFailed {
        snapshot: SnapshotRecord,
        push_error: String,
    },
}

impl BackupOutcome {
    pub fn snapshot(&self) -> Option<&SnapshotRecord> {
        match self {
            BackupOutcome::NoChanges => None,
            BackupOutcome::Committed { snapshot }
            | BackupOutcome::CommittedPushFailed { snapshot, .. } => Some(snapshot),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupResult {
    pub run_id: Uuid,
    pub outcome: BackupOutcome,
    pub sync: SyncReport,
    pub flush_warning: Option<String>,
    pub prune: Option<PruneReport>,
    pub prune_error: Option<String>,
}

impl BackupResult {
    pub fn snapshot_id(&self) -> Option<&str> {
        self.outcome.snapshot().map(|s| s.id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasetRestore {
    Restored { name: String, safety_copy: Option<PathBuf> },
    Skipped { name: String, reason: SkipReason },
    Failed { name: String, error: String },
    NotAttempted { name: String },
}

impl DatasetRestore {
    pub fn name(&self) -> &str {
        match self {
            DatasetRestore::Restored { name, .. }
            | DatasetRestore::Skipped { name, .. }
            | DatasetRestore::Failed { name, .. }
            | DatasetRestore::NotAttempted { name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub run_id: Uuid,
    pub snapshot: SnapshotRecord,
    pub status: RestoreStatus,
    pub datasets: Vec<DatasetRestore>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub phase: RunPhase,
    pub busy: bool,
    pub last_run: Option<RunSummary>,
}

/// Active backup schedule of a running daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    pub enabled: bool,
    pub interval_minutes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, message: &str) -> SnapshotRecord {
        SnapshotRecord {
            id: id.to_string(),
            timestamp: Utc::now(),
            author_name: "tester".to_string(),
            author_email: "tester@example.com".to_string(),
            message: message.to_string(),
            parent_id: None,
        }
    }

    #[test]
    fn test_short_id_and_summary() {
        let snapshot = record("0123456789abcdef", "manual backup\n\nmore detail");
        assert_eq!(snapshot.short_id(), "01234567");
        assert_eq!(snapshot.summary(), "manual backup");

        let tiny = record("abc", "");
        assert_eq!(tiny.short_id(), "abc");
        assert_eq!(tiny.summary(), "");
    }

    #[test]
    fn test_safety_path_is_sibling() {
        let dataset = TrackedDataset::new(
            "world",
            PathBuf::from("/srv/server/world"),
            PathBuf::from("/srv/backups/world"),
        );
        assert_eq!(
            dataset.safety_path(),
            PathBuf::from("/srv/server/world.pre-restore")
        );
    }

    #[test]
    fn test_retention_limit() {
        assert_eq!(RetentionPolicy::new(0).limit(), None);
        assert_eq!(RetentionPolicy::new(-3).limit(), None);
        assert_eq!(RetentionPolicy::unlimited().limit(), None);
        assert_eq!(RetentionPolicy::new(2).limit(), Some(2));
    }

    #[test]
    fn test_backup_result_snapshot_id() {
        let mut result = BackupResult {
            run_id: Uuid::new_v4(),
            outcome: BackupOutcome::CommittedPushFailed {
                snapshot: record("aaaa", "manual backup"),
                push_error: "unreachable".to_string(),
            },
            sync: SyncReport::default(),
            flush_warning: None,
            prune: None,
            prune_error: None,
        };
        assert_eq!(result.snapshot_id(), Some("aaaa"));

        result.outcome = BackupOutcome::NoChanges;
        assert_eq!(result.snapshot_id(), None);
    }

    #[test]
    fn test_outcome_is_tagged_for_clients() {
        let json = serde_json::to_value(BackupOutcome::NoChanges).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "no_changes" }));

        let json = serde_json::to_value(BackupOutcome::Committed {
            snapshot: record("abc", "manual backup"),
        })
        .unwrap();
        assert_eq!(json["kind"], "committed");
        assert_eq!(json["snapshot"]["message"], "manual backup");
    }

    #[test]
    fn test_history_pagination_clamps() {
        let history: Vec<SnapshotRecord> = (0..23)
            .map(|i| record(&format!("{i:040}"), &format!("backup {i}")))
            .collect();

        let first = HistoryPage::paginate(history.clone(), 0, 10);
        assert_eq!(first.page, 1);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.entries.len(), 10);
        assert!(first.has_next());

        let last = HistoryPage::paginate(history.clone(), 99, 10);
        assert_eq!(last.page, 3);
        assert_eq!(last.first_index, 21);
        assert_eq!(last.entries.len(), 3);
        assert_eq!(last.entries[0].message, "backup 20");
        assert!(!last.has_next());

        let empty = HistoryPage::paginate(Vec::new(), 2, 10);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 0);
        assert!(empty.entries.is_empty());
    }
}
