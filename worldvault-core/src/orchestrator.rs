use crate::config::VaultConfig;
use crate::diff::ChangeSet;
use crate::error::{OrchestratorError, RepoError};
use crate::lock::{BackupGuard, BackupLock};
use crate::models::{
    BackupOutcome, BackupResult, DatasetRestore, HistoryPage, OrchestratorStatus, RestoreResult,
    RestoreStatus, RunKind, RunPhase, RunSummary, SkipReason, SnapshotRecord, SyncReport,
    TrackedDataset,
};
use crate::repository::SnapshotRepository;
use crate::retention::RetentionPruner;
use crate::source::DataSource;
use crate::sync::DirectorySynchronizer;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug)]
struct RunState {
    phase: RunPhase,
    last_run: Option<RunSummary>,
}

/// Single entry point for backups and restores.
///
/// Runs are mutually exclusive and never queued: while one holds the
/// [`BackupLock`], every other call that needs the repository returns
/// [`OrchestratorError::Busy`]. The repository is opened on first use.
pub struct SnapshotOrchestrator {
    config: VaultConfig,
    source: Arc<dyn DataSource>,
    synchronizer: DirectorySynchronizer,
    pruner: RetentionPruner,
    lock: BackupLock,
    state: Mutex<RunState>,
}

impl SnapshotOrchestrator {
    pub fn new(config: VaultConfig, source: Arc<dyn DataSource>) -> Result<Self> {
        config.validate()?;
        let pruner = RetentionPruner::new(config.retention());
        Ok(Self {
            config,
            source,
            synchronizer: DirectorySynchronizer::new(),
            pruner,
            lock: BackupLock::new(None),
            state: Mutex::new(RunState {
                phase: RunPhase::Idle,
                last_run: None,
            }),
        })
    }

    /// Builds an orchestrator over the configured directory data source and
    /// opens the repository immediately.
    pub fn from_config(config: VaultConfig) -> Result<Self> {
        let source = Arc::new(config.data_source());
        let orchestrator = Self::new(config, source)?;
        orchestrator.init()?;
        Ok(orchestrator)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Opens the repository, bootstrapping it if needed. Returns its root.
    pub fn init(&self) -> Result<PathBuf> {
        let mut guard = self.lock.try_acquire()?;
        let repo = self.ensure_open(&mut guard)?;
        Ok(repo.root().to_path_buf())
    }

    pub fn status(&self) -> OrchestratorStatus {
        let busy = self.lock.is_held();
        let state = self.state();
        OrchestratorStatus {
            phase: state.phase,
            busy,
            last_run: state.last_run.clone(),
        }
    }

    pub fn history(&self) -> Result<Vec<SnapshotRecord>> {
        let mut guard = self.lock.try_acquire()?;
        let repo = self.ensure_open(&mut guard)?;
        Ok(repo.list_history(&self.config.repository.branch)?)
    }

    pub fn history_page(&self, page: usize) -> Result<HistoryPage> {
        let mut guard = self.lock.try_acquire()?;
        let repo = self.ensure_open(&mut guard)?;
        Ok(repo.history_page(
            &self.config.repository.branch,
            page,
            HistoryPage::DEFAULT_PER_PAGE,
        )?)
    }

    pub fn diff(&self, from: &str, to: Option<&str>) -> Result<ChangeSet> {
        let mut guard = self.lock.try_acquire()?;
        let repo = self.ensure_open(&mut guard)?;
        Ok(repo.diff(from, to)?)
    }

    pub fn live_datasets(&self) -> std::io::Result<Vec<String>> {
        self.source.list_live_datasets()
    }

    /// Closes the repository handle. Later calls fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock.try_acquire()?;
        if let Ok(repo) = guard.repository() {
            repo.close();
        }
        Ok(())
    }

    /// Flushes the data source, mirrors tracked datasets into the repository,
    /// commits if anything changed, then pushes and prunes.
    pub fn run_backup(&self, message: &str) -> Result<BackupResult> {
        let mut guard = self.lock.try_acquire()?;
        let run_id = Uuid::new_v4();
        let span = info_span!("backup", run_id = %run_id);
        let _enter = span.enter();

        info!("Starting backup: {}", message);
        self.set_phase(RunPhase::Acquiring);
        let result = self.backup_locked(&mut guard, run_id, message);

        let (succeeded, detail) = match &result {
            Ok(backup) => match &backup.outcome {
                BackupOutcome::NoChanges => (true, "no changes".to_string()),
                BackupOutcome::Committed { snapshot } => {
                    (true, format!("committed {}", snapshot.short_id()))
                }
                BackupOutcome::CommittedPushFailed { snapshot, .. } => (
                    true,
                    format!("committed {}, push failed", snapshot.short_id()),
                ),
            },
            Err(e) => {
                error!("Backup failed: {}", e);
                (false, e.to_string())
            }
        };
        self.finish(run_id, RunKind::Backup, succeeded, detail);
        result
    }

    /// Checks out `snapshot_id` and copies its datasets over the live ones,
    /// keeping a `.pre-restore` copy of each live dataset it replaces.
    pub fn run_restore(&self, snapshot_id: &str) -> Result<RestoreResult> {
        let mut guard = self.lock.try_acquire()?;
        let run_id = Uuid::new_v4();
        let span = info_span!("restore", run_id = %run_id);
        let _enter = span.enter();

        info!("Starting restore of {}", snapshot_id);
        self.set_phase(RunPhase::Acquiring);
        let result = self.restore_locked(&mut guard, run_id, snapshot_id);

        let (succeeded, detail) = match &result {
            Ok(restore) => (
                restore.status != RestoreStatus::Failed,
                format!(
                    "restore of {} {:?}",
                    restore.snapshot.short_id(),
                    restore.status
                )
                .to_lowercase(),
            ),
            Err(e) => {
                error!("Restore failed: {}", e);
                (false, e.to_string())
            }
        };
        self.finish(run_id, RunKind::Restore, succeeded, detail);
        result
    }

    fn backup_locked(
        &self,
        guard: &mut BackupGuard<'_>,
        run_id: Uuid,
        message: &str,
    ) -> Result<BackupResult> {
        let branch = self.config.repository.branch.as_str();
        let repo = self.ensure_open(guard)?;
        repo.recover_detached_head(branch)?;
        if repo.head_detached()? {
            // Committing here would leave the snapshot off the branch.
            return Err(RepoError::DirtyWorkingTree(repo.dirty_count()?).into());
        }

        self.set_phase(RunPhase::Quiescing);
        let flush_warning = self.quiesce();

        self.set_phase(RunPhase::Synchronizing);
        let (datasets, unresolved) = self.tracked_datasets(repo);
        let mut sync = match self.synchronizer.mirror_in(&datasets) {
            Ok(report) => report,
            Err(failure) => {
                discard_partial_run(repo);
                return Err(failure.into());
            }
        };
        for name in unresolved {
            sync.skip(name, SkipReason::Unresolved);
        }

        self.set_phase(RunPhase::Staging);
        if let Err(e) = repo.stage_all() {
            discard_partial_run(repo);
            return Err(e.into());
        }

        self.set_phase(RunPhase::Committing);
        let snapshot = match repo.commit_if_changed(message, &self.config.author()) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                return Ok(BackupResult {
                    run_id,
                    outcome: BackupOutcome::NoChanges,
                    sync,
                    flush_warning,
                    prune: None,
                    prune_error: None,
                })
            }
            Err(e) => {
                discard_partial_run(repo);
                return Err(e.into());
            }
        };

        self.set_phase(RunPhase::Pushing);
        let push_error = match repo.push(&self.config.repository.remote_url, branch) {
            Ok(_) => None,
            Err(e) => {
                warn!("Push failed, snapshot kept locally: {}", e);
                Some(e.to_string())
            }
        };

        self.set_phase(RunPhase::Pruning);
        let mut snapshot = snapshot;
        let (prune, prune_error) = match self.pruner.prune(repo, branch) {
            Ok(report) => {
                if let Some(tip) = &report.new_tip {
                    // Truncation gives the retained snapshots new ids.
                    match repo.find_snapshot(tip) {
                        Ok(rewritten) => snapshot = rewritten,
                        Err(e) => warn!("Could not read rewritten snapshot {}: {}", tip, e),
                    }
                }
                (Some(report), None)
            }
            Err(e) => {
                warn!("Pruning failed: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let outcome = match push_error {
            None => BackupOutcome::Committed { snapshot },
            Some(push_error) => BackupOutcome::CommittedPushFailed {
                snapshot,
                push_error,
            },
        };
        Ok(BackupResult {
            run_id,
            outcome,
            sync,
            flush_warning,
            prune,
            prune_error,
        })
    }

    fn restore_locked(
        &self,
        guard: &mut BackupGuard<'_>,
        run_id: Uuid,
        snapshot_id: &str,
    ) -> Result<RestoreResult> {
        let branch = self.config.repository.branch.as_str();
        let repo = self.ensure_open(guard)?;

        self.set_phase(RunPhase::CheckingOut);
        let snapshot = repo.checkout(snapshot_id)?;

        self.set_phase(RunPhase::Restoring);
        let (datasets, unresolved) = self.tracked_datasets(repo);
        let mut entries: Vec<DatasetRestore> = unresolved
            .into_iter()
            .map(|name| DatasetRestore::Skipped {
                name,
                reason: SkipReason::Unresolved,
            })
            .collect();

        match self.synchronizer.mirror_out(&datasets) {
            Ok(report) => entries.extend(restore_entries(&report)),
            Err(failure) => {
                error!(
                    "Restore stopped at dataset '{}': {}",
                    failure.error.dataset(),
                    failure.error
                );
                let failed = failure.error.dataset().to_string();
                entries.extend(restore_entries(&failure.completed));
                let mut reached = false;
                for dataset in &datasets {
                    if dataset.name == failed {
                        reached = true;
                        entries.push(DatasetRestore::Failed {
                            name: failed.clone(),
                            error: failure.error.to_string(),
                        });
                    } else if reached {
                        entries.push(DatasetRestore::NotAttempted {
                            name: dataset.name.clone(),
                        });
                    }
                }
            }
        }

        repo.return_to_branch(branch)?;

        let status = restore_status(&entries);
        info!(
            "Restore of {} finished: {:?}",
            snapshot.short_id(),
            status
        );
        Ok(RestoreResult {
            run_id,
            snapshot,
            status,
            datasets: entries,
        })
    }

    fn ensure_open<'g>(
        &self,
        guard: &'g mut BackupGuard<'_>,
    ) -> Result<&'g mut SnapshotRepository> {
        if !guard.is_initialized() {
            let repository = &self.config.repository;
            let repo = SnapshotRepository::bootstrap(
                &repository.path,
                &repository.branch,
                &self.config.backup.excludes,
                &self.config.author(),
            )?
            .with_credentials(self.config.credentials());
            guard.install(repo);
        }
        Ok(guard.repository()?)
    }

    fn quiesce(&self) -> Option<String> {
        if !self.config.backup.flush_before_snapshot {
            return None;
        }
        match self.source.flush_all(self.config.flush_timeout()) {
            Ok(()) => None,
            Err(e) => {
                warn!("Data source flush failed, continuing: {}", e);
                Some(e.to_string())
            }
        }
    }

    /// Resolves configured dataset names. Names the data source does not know
    /// are returned separately.
    fn tracked_datasets(&self, repo: &SnapshotRepository) -> (Vec<TrackedDataset>, Vec<String>) {
        if self.config.backup.datasets.is_empty() {
            warn!("No datasets configured");
        }
        let mut datasets = Vec::new();
        let mut unresolved = Vec::new();
        for name in &self.config.backup.datasets {
            match self.source.resolve_dataset(name) {
                Some(source) => {
                    datasets.push(TrackedDataset::new(name, source, repo.dataset_dir(name)))
                }
                None => {
                    warn!("Dataset '{}' does not exist, skipping", name);
                    unresolved.push(name.clone());
                }
            }
        }
        (datasets, unresolved)
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: RunPhase) {
        self.state().phase = phase;
    }

    fn finish(&self, run_id: Uuid, kind: RunKind, succeeded: bool, detail: String) {
        let mut state = self.state();
        state.phase = if succeeded {
            RunPhase::Idle
        } else {
            RunPhase::Aborted
        };
        state.last_run = Some(RunSummary {
            run_id,
            kind,
            finished_at: Utc::now(),
            succeeded,
            detail,
        });
    }
}

fn discard_partial_run(repo: &mut SnapshotRepository) {
    if let Err(e) = repo.discard_working_changes() {
        error!("Could not reset working tree after failed run: {}", e);
    }
}

fn restore_entries(report: &SyncReport) -> Vec<DatasetRestore> {
    let restored = report.mirrored.iter().map(|m| DatasetRestore::Restored {
        name: m.name.clone(),
        safety_copy: m.safety_copy.clone(),
    });
    let skipped = report.skipped.iter().map(|s| DatasetRestore::Skipped {
        name: s.name.clone(),
        reason: s.reason,
    });
    restored.chain(skipped).collect()
}

fn restore_status(entries: &[DatasetRestore]) -> RestoreStatus {
    let restored = entries
        .iter()
        .filter(|e| matches!(e, DatasetRestore::Restored { .. }))
        .count();
    let failed = entries
        .iter()
        .any(|e| matches!(e, DatasetRestore::Failed { .. } | DatasetRestore::NotAttempted { .. }));

    if failed && restored == 0 {
        RestoreStatus::Failed
    } else if restored < entries.len() {
        RestoreStatus::Partial
    } else {
        RestoreStatus::Success
    }
}
