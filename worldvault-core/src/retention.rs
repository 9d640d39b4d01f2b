use crate::error::Result;
use crate::models::{PruneReport, RetentionPolicy, SnapshotRecord};
use crate::repository::SnapshotRepository;
use tracing::{debug, info};

/// Enforces the retention ceiling by truncating branch history.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPruner {
    policy: RetentionPolicy,
}

impl RetentionPruner {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Records beyond the ceiling, oldest last. `history` must be newest first.
    pub fn candidates<'h>(&self, history: &'h [SnapshotRecord]) -> &'h [SnapshotRecord] {
        match self.policy.limit() {
            Some(limit) if history.len() > limit => &history[limit..],
            _ => &[],
        }
    }

    /// Rewrites `branch` so at most `max_snapshots` snapshots remain reachable.
    pub fn prune(&self, repo: &mut SnapshotRepository, branch: &str) -> Result<PruneReport> {
        let Some(limit) = self.policy.limit() else {
            debug!("Retention is unlimited, nothing to prune");
            return Ok(PruneReport::nothing(repo.list_history(branch)?.len()));
        };

        let history = repo.list_history(branch)?;
        let candidates = self.candidates(&history);
        if candidates.is_empty() {
            debug!(
                "{} snapshot(s) within the limit of {}",
                history.len(),
                limit
            );
            return Ok(PruneReport::nothing(history.len()));
        }

        info!(
            "Pruning {} snapshot(s) older than {}",
            candidates.len(),
            history[limit - 1].short_id()
        );
        repo.truncate_history(branch, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn record(n: usize) -> SnapshotRecord {
        SnapshotRecord {
            id: format!("{n:040}"),
            timestamp: Utc::now(),
            author_name: "tester".to_string(),
            author_email: "tester@example.com".to_string(),
            message: format!("backup {n}"),
            parent_id: None,
        }
    }

    #[test]
    fn test_candidates() {
        let history: Vec<SnapshotRecord> = (0..5).map(record).collect();

        let pruner = RetentionPruner::new(RetentionPolicy::new(3));
        let candidates = pruner.candidates(&history);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].message, "backup 3");

        assert!(RetentionPruner::new(RetentionPolicy::new(5))
            .candidates(&history)
            .is_empty());
        assert!(RetentionPruner::new(RetentionPolicy::new(0))
            .candidates(&history)
            .is_empty());
        assert!(RetentionPruner::new(RetentionPolicy::new(-1))
            .candidates(&history)
            .is_empty());
    }

    #[test]
    fn test_prune_truncates_repository_history() {
        let dir = TempDir::new().unwrap();
        let author = Author::new("tester", "tester@example.com");
        let mut repo = SnapshotRepository::bootstrap(dir.path(), "main", &[], &author).unwrap();
        for i in 0..3 {
            fs::write(dir.path().join(format!("file{i}.txt")), format!("{i}")).unwrap();
            repo.stage_all().unwrap();
            repo.commit_if_changed(&format!("backup {i}"), &author)
                .unwrap()
                .unwrap();
        }

        let report = RetentionPruner::new(RetentionPolicy::new(2))
            .prune(&mut repo, "main")
            .unwrap();
        assert_eq!(report.removed, 2);

        let history = repo.list_history("main").unwrap();
        let messages: Vec<&str> = history.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["backup 2", "backup 1"]);
    }

    #[test]
    fn test_prune_unlimited_leaves_history() {
        let dir = TempDir::new().unwrap();
        let author = Author::new("tester", "tester@example.com");
        let mut repo = SnapshotRepository::bootstrap(dir.path(), "main", &[], &author).unwrap();

        let report = RetentionPruner::new(RetentionPolicy::unlimited())
            .prune(&mut repo, "main")
            .unwrap();
        assert_eq!(report, PruneReport::nothing(1));
    }
}
