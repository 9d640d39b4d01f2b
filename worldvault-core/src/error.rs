use std::path::PathBuf;
use thiserror::Error;

use crate::models::SyncReport;

pub type Result<T> = std::result::Result<T, RepoError>;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("IO failure at {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt repository at {path}: {reason}")]
    CorruptRepository { path: PathBuf, reason: String },

    #[error("Repository at {0} is already open in this process")]
    AlreadyOpen(PathBuf),

    #[error("Repository handle is closed")]
    Closed,

    #[error("Unknown snapshot: {0}")]
    UnknownSnapshot(String),

    #[error("Working tree has {0} uncommitted change(s); refusing to overwrite them")]
    DirtyWorkingTree(usize),

    #[error("Invalid remote {url}: {reason}")]
    InvalidRemote { url: String, reason: String },

    #[error("Remote {url} rejected credentials: {reason}")]
    AuthRejected { url: String, reason: String },

    #[error("Transport failure talking to {url}: {reason}")]
    TransportFailure { url: String, reason: String },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

impl RepoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RepoError::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// Push failures never invalidate the local commit.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            RepoError::InvalidRemote { .. }
                | RepoError::AuthRejected { .. }
                | RepoError::TransportFailure { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to walk {path} for dataset '{dataset}': {source}")]
    Walk {
        dataset: String,
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to copy {path} for dataset '{dataset}': {source}")]
    Copy {
        dataset: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path} for dataset '{dataset}': {source}")]
    Remove {
        dataset: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create safety copy {path} for dataset '{dataset}': {source}")]
    SafetyCopy {
        dataset: String,
        path: PathBuf,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn dataset(&self) -> &str {
        match self {
            SyncError::Walk { dataset, .. }
            | SyncError::Copy { dataset, .. }
            | SyncError::Remove { dataset, .. }
            | SyncError::SafetyCopy { dataset, .. } => dataset,
        }
    }
}

/// A synchronizer run that stopped partway. `completed` holds the datasets
/// that were fully mirrored before `error` occurred.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct SyncFailure {
    pub completed: SyncReport,
    #[source]
    pub error: SyncError,
}

#[derive(Error, Debug)]
pub enum FlushError {
    #[error("Flush did not finish within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Flush command failed: {0}")]
    Failed(String),

    #[error("IO error while flushing: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Another backup or restore is already running")]
    Busy,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error(transparent)]
    Sync(#[from] SyncFailure),
}
