//! # worldvault-sdk
//!
//! Blocking client for the HTTP API of a running worldvault daemon.
//!
//! ## Example
//!
//! ```no_run
//! use worldvault_sdk::VaultClient;
//!
//! let client = VaultClient::new("http://localhost:3030");
//!
//! // Take a snapshot now
//! let result = client.backup(Some("before upgrading plugins")).unwrap();
//! println!("{:?}", result.outcome);
//!
//! // Browse the newest snapshots
//! let page = client.snapshots(1).unwrap();
//! for snapshot in page.entries {
//!     println!("{} {}", snapshot.short_id(), snapshot.summary());
//! }
//! ```

use anyhow::{bail, Result};
use reqwest::blocking::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use worldvault_core::{
    BackupResult, HistoryPage, OrchestratorStatus, RestoreResult, ScheduleStatus,
};

#[derive(Clone)]
pub struct VaultClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct BackupRequest<'a> {
    message: Option<&'a str>,
}

#[derive(Serialize)]
struct RestoreRequest<'a> {
    snapshot_id: &'a str,
}

impl VaultClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the daemon (e.g., "http://localhost:3030")
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a backup now. The daemon uses its default message when `message` is `None`.
    pub fn backup(&self, message: Option<&str>) -> Result<BackupResult> {
        let response = self
            .client
            .post(self.url("/backups"))
            .json(&BackupRequest { message })
            .send()?;
        parse(response)
    }

    /// Restore the live datasets from a snapshot
    pub fn restore(&self, snapshot_id: &str) -> Result<RestoreResult> {
        let response = self
            .client
            .post(self.url("/restore"))
            .json(&RestoreRequest { snapshot_id })
            .send()?;
        parse(response)
    }

    /// One page of snapshot history, newest first
    pub fn snapshots(&self, page: usize) -> Result<HistoryPage> {
        let response = self
            .client
            .get(self.url("/snapshots"))
            .query(&[("page", page)])
            .send()?;
        parse(response)
    }

    pub fn status(&self) -> Result<OrchestratorStatus> {
        parse(self.client.get(self.url("/status")).send()?)
    }

    pub fn schedule(&self) -> Result<ScheduleStatus> {
        parse(self.client.get(self.url("/schedule")).send()?)
    }

    /// Re-reads the backup interval from the daemon's configuration file
    /// and restarts its schedule.
    pub fn reload(&self) -> Result<ScheduleStatus> {
        parse(self.client.post(self.url("/reload")).send()?)
    }

    pub fn live_datasets(&self) -> Result<Vec<String>> {
        parse(self.client.get(self.url("/live-datasets")).send()?)
    }

    /// Check server health
    pub fn health_check(&self) -> Result<bool> {
        let response = self.client.get(self.url("/health")).send()?;
        Ok(response.status().is_success())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Decodes a successful response, or turns the daemon's error text into the error.
fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().unwrap_or_default();
        bail!("daemon returned {}: {}", status, text);
    }
    Ok(response.json()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{mpsc, Arc};
    use tempfile::TempDir;
    use worldvault_core::{SnapshotOrchestrator, VaultConfig};
    use worldvault_server::api::{create_router, AppState};

    /// Serves the API on an ephemeral port from a background runtime.
    fn spawn_daemon(dir: &TempDir) -> String {
        let mut config = VaultConfig::default();
        config.repository.path = dir.path().join("backups");
        config.source.root = dir.path().join("server");
        config.backup.datasets = vec!["world".to_string()];
        fs::create_dir_all(config.source.root.join("world")).unwrap();
        fs::write(config.source.root.join("world/a.txt"), "1").unwrap();
        let state = AppState::new(Arc::new(SnapshotOrchestrator::from_config(config).unwrap()));

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, create_router(state)).await.unwrap();
            });
        });
        format!("http://{}", rx.recv().unwrap())
    }

    #[test]
    fn test_client_creation() {
        let client = VaultClient::new("http://localhost:3030/");
        assert_eq!(client.base_url(), "http://localhost:3030");
        assert_eq!(client.url("/status"), "http://localhost:3030/status");
    }

    #[test]
    fn test_round_trip_against_daemon() {
        let dir = TempDir::new().unwrap();
        let client = VaultClient::new(spawn_daemon(&dir));

        assert!(client.health_check().unwrap());
        assert_eq!(client.live_datasets().unwrap(), vec!["world".to_string()]);

        let backup = client.backup(Some("from the sdk")).unwrap();
        let id = backup.snapshot_id().unwrap().to_string();

        let page = client.snapshots(1).unwrap();
        assert_eq!(page.entries[0].message, "from the sdk");

        let restore = client.restore(&id).unwrap();
        assert_eq!(restore.snapshot.id, id);
        assert!(!client.status().unwrap().busy);

        assert!(!client.schedule().unwrap().enabled);
        let reloaded = client.reload().unwrap();
        assert!(reloaded.enabled);
        assert_eq!(reloaded.interval_minutes, 60);
    }

    #[test]
    fn test_error_text_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let client = VaultClient::new(spawn_daemon(&dir));

        let err = client.restore("missing").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("404"));
        assert!(text.contains("Unknown snapshot"));
    }
}
