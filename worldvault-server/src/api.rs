use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use crate::scheduler::ScheduleControl;
use worldvault_core::{
    BackupResult, HistoryPage, OrchestratorError, OrchestratorStatus, RepoError, RestoreResult,
    ScheduleStatus, SnapshotOrchestrator,
};

pub const DEFAULT_BACKUP_MESSAGE: &str = "manual backup";

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SnapshotOrchestrator>,
    pub schedule: Arc<ScheduleControl>,
}

impl AppState {
    /// State whose schedule reloads from the orchestrator's own settings.
    pub fn new(orchestrator: Arc<SnapshotOrchestrator>) -> Self {
        let schedule = Arc::new(ScheduleControl::new(Arc::clone(&orchestrator), None));
        Self {
            orchestrator,
            schedule,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/snapshots", get(get_snapshots))
        .route("/backups", post(create_backup))
        .route("/restore", post(restore_snapshot))
        .route("/live-datasets", get(get_live_datasets))
        .route("/schedule", get(get_schedule))
        .route("/reload", post(reload_schedule))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn get_status(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.status())
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<usize>,
}

async fn get_snapshots(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<HistoryPage> {
    let page = query.page.unwrap_or(1);
    blocking(move || state.orchestrator.history_page(page)).await
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct BackupRequest {
    message: Option<String>,
}

async fn create_backup(
    State(state): State<AppState>,
    Json(req): Json<BackupRequest>,
) -> ApiResult<BackupResult> {
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BACKUP_MESSAGE.to_string());
    blocking(move || state.orchestrator.run_backup(&message)).await
}

#[derive(Deserialize)]
struct RestoreRequest {
    snapshot_id: String,
}

async fn restore_snapshot(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> ApiResult<RestoreResult> {
    blocking(move || state.orchestrator.run_restore(&req.snapshot_id)).await
}

async fn get_live_datasets(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    state
        .orchestrator
        .live_datasets()
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn get_schedule(State(state): State<AppState>) -> Json<ScheduleStatus> {
    Json(state.schedule.status().await)
}

async fn reload_schedule(State(state): State<AppState>) -> ApiResult<ScheduleStatus> {
    state
        .schedule
        .reload()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}

/// Runs an orchestrator call on the blocking pool; copies and git work can
/// take arbitrarily long.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, OrchestratorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .map_err(|e| (status_for(&e), e.to_string()))
}

fn status_for(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::Busy => StatusCode::CONFLICT,
        OrchestratorError::Repository(RepoError::UnknownSnapshot(_)) => StatusCode::NOT_FOUND,
        OrchestratorError::Repository(RepoError::DirtyWorkingTree(_)) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use worldvault_core::VaultConfig;

    fn state(dir: &Path) -> AppState {
        let mut config = VaultConfig::default();
        config.repository.path = dir.join("backups");
        config.source.root = dir.join("server");
        config.backup.datasets = vec!["world".to_string()];
        fs::create_dir_all(config.source.root.join("world")).unwrap();
        fs::write(config.source.root.join("world/a.txt"), "1").unwrap();
        AppState::new(Arc::new(SnapshotOrchestrator::from_config(config).unwrap()))
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = create_router(state.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(&state(dir.path()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_backup_list_and_restore() {
        let dir = TempDir::new().unwrap();
        let state = state(dir.path());

        let (status, body) = send(&state, "POST", "/backups", Some(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let backup: BackupResult = serde_json::from_slice(&body).unwrap();
        let snapshot = backup.outcome.snapshot().unwrap().clone();
        assert_eq!(snapshot.message, DEFAULT_BACKUP_MESSAGE);

        let (status, body) = send(&state, "GET", "/snapshots?page=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let page: HistoryPage = serde_json::from_slice(&body).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.entries[0].id, snapshot.id);

        let (status, body) = send(
            &state,
            "POST",
            "/restore",
            Some(serde_json::json!({ "snapshot_id": snapshot.id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let restore: RestoreResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(restore.snapshot.id, snapshot.id);
    }

    #[tokio::test]
    async fn test_unknown_snapshot_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (status, _) = send(
            &state(dir.path()),
            "POST",
            "/restore",
            Some(serde_json::json!({ "snapshot_id": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_and_live_datasets() {
        let dir = TempDir::new().unwrap();
        let state = state(dir.path());

        let (status, body) = send(&state, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        let current: OrchestratorStatus = serde_json::from_slice(&body).unwrap();
        assert!(!current.busy);

        let (_, body) = send(&state, "GET", "/live-datasets", None).await;
        let names: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(names, vec!["world".to_string()]);
    }

    #[tokio::test]
    async fn test_reload_restarts_schedule() {
        let dir = TempDir::new().unwrap();
        let state = state(dir.path());

        let (status, body) = send(&state, "GET", "/schedule", None).await;
        assert_eq!(status, StatusCode::OK);
        let before: ScheduleStatus = serde_json::from_slice(&body).unwrap();
        assert!(!before.enabled);

        let (status, body) = send(&state, "POST", "/reload", None).await;
        assert_eq!(status, StatusCode::OK);
        let after: ScheduleStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            after,
            ScheduleStatus {
                enabled: true,
                interval_minutes: 60
            }
        );
        state.schedule.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_with_broken_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let base = state(dir.path());
        let config_path = dir.path().join("worldvault.toml");
        fs::write(&config_path, "[backup\n").unwrap();
        let state = AppState {
            schedule: Arc::new(ScheduleControl::new(
                Arc::clone(&base.orchestrator),
                Some(config_path),
            )),
            ..base
        };

        let (status, _) = send(&state, "POST", "/reload", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&OrchestratorError::Busy), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&OrchestratorError::Repository(RepoError::DirtyWorkingTree(3))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&OrchestratorError::Repository(RepoError::Closed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
