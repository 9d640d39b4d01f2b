pub mod diff;
pub mod init;
pub mod list;
pub mod now;
pub mod reload;
pub mod restore;
pub mod serve;
pub mod status;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use worldvault_core::{SnapshotOrchestrator, VaultConfig};
use worldvault_sdk::VaultClient;

/// Where a command runs: against the local repository, or through a daemon.
pub struct Target {
    config_path: PathBuf,
    server: Option<String>,
}

impl Target {
    pub fn new(config_path: PathBuf, server: Option<String>) -> Self {
        Self {
            config_path,
            server,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn client(&self) -> Option<VaultClient> {
        self.server.as_deref().map(VaultClient::new)
    }

    pub fn load_config(&self) -> Result<VaultConfig> {
        debug!("Loading configuration from {:?}", self.config_path);
        VaultConfig::load_or_default(&self.config_path)
            .with_context(|| format!("Failed to load {}", self.config_path.display()))
    }

    pub fn orchestrator(&self) -> Result<SnapshotOrchestrator> {
        let config = self.load_config()?;
        SnapshotOrchestrator::from_config(config).context("Failed to open snapshot repository")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_client_only_with_server() {
        let local = Target::new(PathBuf::from("worldvault.toml"), None);
        assert!(local.client().is_none());

        let remote = Target::new(
            PathBuf::from("worldvault.toml"),
            Some("http://localhost:3030/".to_string()),
        );
        assert_eq!(remote.client().unwrap().base_url(), "http://localhost:3030");
    }

    #[test]
    fn test_orchestrator_uses_paths_next_to_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("worldvault.toml");
        assert!(VaultConfig::write_default(&config_path).unwrap());

        let target = Target::new(config_path, None);
        let orchestrator = target.orchestrator().unwrap();

        let expected = std::fs::canonicalize(temp_dir.path().join("backups")).unwrap();
        assert_eq!(orchestrator.init().unwrap(), expected);
        assert!(temp_dir.path().join("backups/.git").exists());
    }

    #[test]
    fn test_broken_config_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("worldvault.toml");
        std::fs::write(&config_path, "[repository\n").unwrap();

        let target = Target::new(config_path, None);
        let err = target.orchestrator().err().unwrap();
        assert!(err.to_string().contains("Failed to load"));
    }
}
