use crate::api::{create_router, AppState};
use crate::scheduler::ScheduleControl;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use worldvault_core::{SnapshotOrchestrator, VaultConfig};

pub struct VaultServer {
    orchestrator: Arc<SnapshotOrchestrator>,
    config_path: Option<PathBuf>,
}

impl VaultServer {
    pub fn new(config: VaultConfig) -> anyhow::Result<Self> {
        let orchestrator = Arc::new(SnapshotOrchestrator::from_config(config)?);
        Ok(Self {
            orchestrator,
            config_path: None,
        })
    }

    /// File that `POST /reload` re-reads the backup interval from.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn orchestrator(&self) -> Arc<SnapshotOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Serves the HTTP API and runs scheduled backups until Ctrl-C.
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let config = self.orchestrator.config();
        let schedule = Arc::new(ScheduleControl::new(
            Arc::clone(&self.orchestrator),
            self.config_path.clone(),
        ));
        schedule.start().await;

        let state = AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            schedule: Arc::clone(&schedule),
        };
        let app = create_router(state).layer(TraceLayer::new_for_http());

        info!("Server listening on {}", addr);
        info!("Repository: {:?}", config.repository.path);
        info!("Datasets: {:?}", config.backup.datasets);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        schedule.shutdown().await;
        if let Err(e) = self.orchestrator.close() {
            warn!("Could not close repository cleanly: {}", e);
        }
        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_creation() {
        let temp_dir = TempDir::new().unwrap();

        let mut config = VaultConfig::default();
        config.repository.path = temp_dir.path().join("backups");
        config.source.root = temp_dir.path().to_path_buf();
        let server = VaultServer::new(config);

        assert!(server.is_ok());
        assert!(temp_dir.path().join("backups/.git").exists());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let temp_dir = TempDir::new().unwrap();

        let mut config = VaultConfig::default();
        config.repository.path = temp_dir.path().join("backups");
        config.repository.branch = String::new();

        assert!(VaultServer::new(config).is_err());
    }
}
