use crate::error::ConfigError;
use crate::models::{Author, RetentionPolicy};
use crate::repository::RemoteCredentials;
use crate::source::{is_dataset_name, DirectoryDataSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "worldvault.toml";

/// Longest accepted backup interval: one year.
pub const MAX_INTERVAL_MINUTES: i64 = 365 * 24 * 60;

/// Converts a configured interval to a period. `None` when scheduling is
/// disabled (`<= 0`) or the value is out of range.
pub fn interval_from_minutes(minutes: i64) -> Option<Duration> {
    if minutes > MAX_INTERVAL_MINUTES {
        return None;
    }
    u64::try_from(minutes)
        .ok()
        .filter(|minutes| *minutes > 0)
        .and_then(|minutes| minutes.checked_mul(60))
        .map(Duration::from_secs)
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for a vault, read from `worldvault.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub repository: RepositoryConfig,
    pub remote: RemoteConfig,
    pub backup: BackupConfig,
    pub source: SourceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub path: PathBuf,
    /// Empty disables pushing.
    pub remote_url: String,
    pub branch: String,
    pub author: AuthorConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("backups"),
            remote_url: String::new(),
            branch: "main".to_string(),
            author: AuthorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorConfig {
    pub name: String,
    pub email: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: "worldvault".to_string(),
            email: "worldvault@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Name of the environment variable holding the password or token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Zero or negative disables scheduled backups.
    pub interval_minutes: i64,
    pub datasets: Vec<String>,
    pub excludes: Vec<String>,
    /// Zero or negative keeps every snapshot.
    pub max_snapshots: i64,
    pub flush_before_snapshot: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            datasets: Vec::new(),
            excludes: Vec::new(),
            max_snapshots: 50,
            flush_before_snapshot: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory whose subdirectories are the live datasets.
    pub root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_command: Option<Vec<String>>,
    pub flush_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            flush_command: None,
            flush_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3030".to_string(),
        }
    }
}

impl VaultConfig {
    /// Reads and validates `path`. Relative paths inside the file are
    /// resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.resolve_relative_to(base_dir(path));
        config.validate()?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Like [`VaultConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        warn!("No configuration at {:?}, using defaults", path);
        let mut config = Self::default();
        config.resolve_relative_to(base_dir(path));
        Ok(config)
    }

    /// Writes the default configuration to `path` unless a file already exists.
    /// Returns whether a file was written.
    pub fn write_default(path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(&Self::default())?;
        fs::write(path, content).map_err(io_err)?;
        Ok(true)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.repository.path.as_os_str().is_empty() {
            return invalid("repository.path must not be empty");
        }
        if self.repository.branch.trim().is_empty() {
            return invalid("repository.branch must not be empty");
        }
        if self.repository.author.name.trim().is_empty()
            || self.repository.author.email.trim().is_empty()
        {
            return invalid("repository.author needs a name and an email");
        }
        if self.backup.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "backup.interval_minutes must be at most {MAX_INTERVAL_MINUTES}"
            )));
        }
        if self.source.flush_timeout_secs == 0 {
            return invalid("source.flush_timeout_secs must be greater than zero");
        }

        let mut seen = HashSet::new();
        for name in &self.backup.datasets {
            if !is_dataset_name(name) {
                return Err(ConfigError::Invalid(format!(
                    "dataset name '{name}' must be a single directory name"
                )));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "dataset '{name}' is listed more than once"
                )));
            }
        }
        Ok(())
    }

    pub fn author(&self) -> Author {
        Author::new(&self.repository.author.name, &self.repository.author.email)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.backup.max_snapshots)
    }

    /// Period between scheduled backups, or `None` when scheduling is disabled.
    pub fn interval(&self) -> Option<Duration> {
        interval_from_minutes(self.backup.interval_minutes)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.source.flush_timeout_secs)
    }

    /// Credentials for the remote; the password is read from the environment.
    pub fn credentials(&self) -> RemoteCredentials {
        let password = self
            .remote
            .password_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        RemoteCredentials {
            username: self.remote.username.clone(),
            password,
        }
    }

    pub fn data_source(&self) -> DirectoryDataSource {
        DirectoryDataSource::new(&self.source.root)
            .with_flush_command(self.source.flush_command.clone().unwrap_or_default())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [&mut self.repository.path, &mut self.source.root] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

fn base_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}
