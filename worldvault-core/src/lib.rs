//! # worldvault-core
//!
//! Core library for worldvault - versioned git snapshots of live world directories.
//!
//! This crate provides the snapshot repository, the directory synchronizer that
//! mirrors datasets in and out of it, retention pruning, and the orchestrator
//! that sequences backup and restore runs under a single non-blocking lock.

pub mod config;
pub mod diff;
pub mod error;
pub mod lock;
pub mod models;
pub mod orchestrator;
pub mod repository;
pub mod retention;
pub mod source;
pub mod sync;

pub use config::VaultConfig;
pub use diff::{ChangeSet, ChangeType, FileChange};
pub use error::{ConfigError, FlushError, OrchestratorError, RepoError, Result, SyncError};
pub use models::{
    Author, BackupOutcome, BackupResult, DatasetRestore, HistoryPage, OrchestratorStatus,
    RestoreResult, RestoreStatus, RetentionPolicy, RunPhase, ScheduleStatus, SnapshotRecord,
    TrackedDataset,
};
pub use orchestrator::SnapshotOrchestrator;
pub use repository::{PushAck, RemoteCredentials, SnapshotRepository};
pub use retention::RetentionPruner;
pub use source::{DataSource, DirectoryDataSource};
pub use sync::DirectorySynchronizer;
