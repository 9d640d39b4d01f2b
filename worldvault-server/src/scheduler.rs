use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use worldvault_core::config::interval_from_minutes;
use worldvault_core::{
    BackupOutcome, ConfigError, OrchestratorError, ScheduleStatus, SnapshotOrchestrator,
    VaultConfig,
};

/// Periodically triggers backups on the orchestrator.
///
/// The first backup runs one full period after start. A tick that arrives
/// while a backup is still running is skipped rather than queued.
pub struct BackupScheduler {
    period: Duration,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    orchestrator: Arc<SnapshotOrchestrator>,
}

impl BackupScheduler {
    /// Starts the schedule, or returns `None` when `interval_minutes <= 0`.
    pub fn start(orchestrator: Arc<SnapshotOrchestrator>, interval_minutes: i64) -> Option<Self> {
        match interval_from_minutes(interval_minutes) {
            Some(period) => Some(Self::start_with_period(orchestrator, period)),
            None if interval_minutes > 0 => {
                warn!(
                    "Backup interval of {} minutes is out of range, scheduled backups are disabled",
                    interval_minutes
                );
                None
            }
            None => {
                info!("Scheduled backups are disabled");
                None
            }
        }
    }

    pub fn start_with_period(orchestrator: Arc<SnapshotOrchestrator>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_schedule(
            Arc::clone(&orchestrator),
            period,
            token.clone(),
        ));
        info!("Scheduled backups every {:?}", period);

        Self {
            period,
            token,
            handle: Some(handle),
            orchestrator,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the schedule and waits for an in-flight backup to finish.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
            info!("Scheduled backups stopped");
        }
    }

    /// Stops the current schedule and starts a new one with another interval.
    pub async fn restart(mut self, interval_minutes: i64) -> Option<Self> {
        self.stop().await;
        Self::start(Arc::clone(&self.orchestrator), interval_minutes)
    }
}

/// Owns the daemon's schedule so it can be replaced while serving.
///
/// `reload` re-reads the interval from the configuration file and restarts
/// the schedule with it. Other settings take effect on the next start.
pub struct ScheduleControl {
    orchestrator: Arc<SnapshotOrchestrator>,
    config_path: Option<PathBuf>,
    current: Mutex<Option<BackupScheduler>>,
    interval_minutes: AtomicI64,
}

impl ScheduleControl {
    pub fn new(orchestrator: Arc<SnapshotOrchestrator>, config_path: Option<PathBuf>) -> Self {
        let interval_minutes = orchestrator.config().backup.interval_minutes;
        Self {
            orchestrator,
            config_path,
            current: Mutex::new(None),
            interval_minutes: AtomicI64::new(interval_minutes),
        }
    }

    /// Starts the schedule with the interval the orchestrator was built with.
    pub async fn start(&self) -> ScheduleStatus {
        let minutes = self.orchestrator.config().backup.interval_minutes;
        self.apply(minutes).await
    }

    pub async fn reload(&self) -> Result<ScheduleStatus, ConfigError> {
        let minutes = match &self.config_path {
            Some(path) => {
                let config = VaultConfig::load(path)?;
                info!("Reloaded schedule from {:?}", path);
                config.backup.interval_minutes
            }
            None => self.interval_minutes.load(Ordering::Acquire),
        };
        Ok(self.apply(minutes).await)
    }

    pub async fn status(&self) -> ScheduleStatus {
        let enabled = self
            .current
            .lock()
            .await
            .as_ref()
            .is_some_and(BackupScheduler::is_running);
        ScheduleStatus {
            enabled,
            interval_minutes: self.interval_minutes.load(Ordering::Acquire),
        }
    }

    pub async fn shutdown(&self) {
        if let Some(mut scheduler) = self.current.lock().await.take() {
            scheduler.stop().await;
        }
    }

    async fn apply(&self, minutes: i64) -> ScheduleStatus {
        let mut current = self.current.lock().await;
        *current = match current.take() {
            Some(scheduler) => scheduler.restart(minutes).await,
            None => BackupScheduler::start(Arc::clone(&self.orchestrator), minutes),
        };
        self.interval_minutes.store(minutes, Ordering::Release);
        ScheduleStatus {
            enabled: current.is_some(),
            interval_minutes: minutes,
        }
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_schedule(
    orchestrator: Arc<SnapshotOrchestrator>,
    period: Duration,
    token: CancellationToken,
) {
    let Some(start) = Instant::now().checked_add(period) else {
        error!("Backup period {:?} is out of range, not scheduling", period);
        return;
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let orchestrator = Arc::clone(&orchestrator);
                let message = format!("Scheduled backup - {}", Utc::now().to_rfc3339());
                let run = tokio::task::spawn_blocking(move || orchestrator.run_backup(&message));
                match run.await {
                    Ok(Ok(result)) => match result.outcome {
                        BackupOutcome::NoChanges => info!("Scheduled backup found no changes"),
                        BackupOutcome::Committed { snapshot } => {
                            info!("Scheduled backup created {}", snapshot.short_id())
                        }
                        BackupOutcome::CommittedPushFailed { snapshot, push_error } => warn!(
                            "Scheduled backup created {} but push failed: {}",
                            snapshot.short_id(),
                            push_error
                        ),
                    },
                    Ok(Err(OrchestratorError::Busy)) => {
                        warn!("Skipping scheduled backup, another run is in progress")
                    }
                    Ok(Err(e)) => error!("Scheduled backup failed: {}", e),
                    Err(e) => error!("Scheduled backup task panicked: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use worldvault_core::VaultConfig;

    fn orchestrator(dir: &TempDir) -> Arc<SnapshotOrchestrator> {
        let mut config = VaultConfig::default();
        config.repository.path = dir.path().join("backups");
        config.source.root = dir.path().join("server");
        config.backup.datasets = vec!["world".to_string()];
        fs::create_dir_all(config.source.root.join("world")).unwrap();
        fs::write(config.source.root.join("world/a.txt"), "1").unwrap();
        Arc::new(SnapshotOrchestrator::from_config(config).unwrap())
    }

    #[tokio::test]
    async fn test_disabled_interval_does_not_start() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir);

        assert!(BackupScheduler::start(Arc::clone(&orchestrator), 0).is_none());
        assert!(BackupScheduler::start(orchestrator, -5).is_none());
    }

    #[tokio::test]
    async fn test_interval_in_minutes() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = BackupScheduler::start(orchestrator(&dir), 60).unwrap();
        assert_eq!(scheduler.period(), Duration::from_secs(3600));
        assert!(scheduler.is_running());
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_scheduled_backups_run_until_stopped() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir);
        let mut scheduler =
            BackupScheduler::start_with_period(Arc::clone(&orchestrator), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(400)).await;
        scheduler.stop().await;
        scheduler.stop().await;

        let history = orchestrator.history().unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].message.starts_with("Scheduled backup - "));
        assert!(orchestrator.status().last_run.is_some());

        let runs_after_stop = orchestrator.status().last_run;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(orchestrator.status().last_run, runs_after_stop);
    }

    #[tokio::test]
    async fn test_out_of_range_interval_does_not_start() {
        let dir = TempDir::new().unwrap();
        assert!(BackupScheduler::start(orchestrator(&dir), i64::MAX).is_none());
    }

    #[tokio::test]
    async fn test_reload_reads_interval_from_file() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir);
        let config_path = dir.path().join("worldvault.toml");
        fs::write(&config_path, "[backup]\ninterval_minutes = 15\n").unwrap();
        let control = ScheduleControl::new(orchestrator, Some(config_path.clone()));

        let started = control.start().await;
        assert_eq!(
            started,
            ScheduleStatus {
                enabled: true,
                interval_minutes: 60
            }
        );

        let reloaded = control.reload().await.unwrap();
        assert_eq!(reloaded.interval_minutes, 15);
        assert!(reloaded.enabled);
        assert_eq!(control.status().await, reloaded);

        fs::write(&config_path, "[backup]\ninterval_minutes = 0\n").unwrap();
        assert!(!control.reload().await.unwrap().enabled);
        assert!(!control.status().await.enabled);

        fs::write(&config_path, "[backup\n").unwrap();
        assert!(control.reload().await.is_err());
        assert_eq!(control.status().await.interval_minutes, 0);

        control.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_changes_interval() {
        let dir = TempDir::new().unwrap();
        let scheduler = BackupScheduler::start(orchestrator(&dir), 60).unwrap();

        let mut restarted = scheduler.restart(5).await.unwrap();
        assert_eq!(restarted.period(), Duration::from_secs(300));
        restarted.stop().await;

        let disabled = restarted.restart(0).await;
        assert!(disabled.is_none());
    }
}
