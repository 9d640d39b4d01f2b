use crate::error::{OrchestratorError, RepoError};
use crate::repository::SnapshotRepository;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use tracing::warn;

/// Mutual exclusion for orchestrator runs. The lock owns the repository
/// handle, so holding the guard is the only way to touch the repository.
///
/// Acquisition never waits: a held lock yields `OrchestratorError::Busy`.
#[derive(Debug, Default)]
pub struct BackupLock {
    slot: Mutex<Option<SnapshotRepository>>,
    held: AtomicBool,
}

pub struct BackupGuard<'a> {
    slot: MutexGuard<'a, Option<SnapshotRepository>>,
    held: &'a AtomicBool,
}

impl BackupLock {
    pub fn new(repository: Option<SnapshotRepository>) -> Self {
        Self {
            slot: Mutex::new(repository),
            held: AtomicBool::new(false),
        }
    }

    pub fn try_acquire(&self) -> Result<BackupGuard<'_>, OrchestratorError> {
        let slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::WouldBlock) => return Err(OrchestratorError::Busy),
            Err(TryLockError::Poisoned(poisoned)) => {
                // A panicking run already released the lock; the repository
                // state itself is recovered by the next run.
                warn!("Previous run panicked while holding the backup lock");
                poisoned.into_inner()
            }
        };
        self.held.store(true, Ordering::Release);
        Ok(BackupGuard {
            slot,
            held: &self.held,
        })
    }

    /// Whether a guard is alive. Reads a flag only, so polling it never
    /// contends with `try_acquire`.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for BackupGuard<'_> {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

impl BackupGuard<'_> {
    pub fn is_initialized(&self) -> bool {
        self.slot.is_some()
    }

    pub fn install(&mut self, repository: SnapshotRepository) {
        *self.slot = Some(repository);
    }

    pub fn repository(&mut self) -> Result<&mut SnapshotRepository, RepoError> {
        self.slot.as_mut().ok_or(RepoError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let lock = BackupLock::default();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_held());
        assert!(matches!(lock.try_acquire(), Err(OrchestratorError::Busy)));

        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_ok());
    }

    #[test]
    fn test_polling_never_makes_acquire_busy() {
        let lock = std::sync::Arc::new(BackupLock::default());
        let stop = std::sync::Arc::new(AtomicBool::new(false));
        let pollers: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        std::hint::black_box(lock.is_held());
                    }
                })
            })
            .collect();

        for _ in 0..10_000 {
            let guard = lock.try_acquire().unwrap();
            assert!(lock.is_held());
            drop(guard);
        }
        stop.store(true, Ordering::Relaxed);
        for poller in pollers {
            poller.join().unwrap();
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let lock = std::sync::Arc::new(BackupLock::default());
        let held = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = held.try_acquire().unwrap();
            panic!("run failed");
        })
        .join();

        let mut guard = lock.try_acquire().unwrap();
        assert!(!guard.is_initialized());
        assert!(matches!(guard.repository(), Err(RepoError::Closed)));
    }
}
