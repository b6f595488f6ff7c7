use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use shared::{
    domain::{ControlAction, ProcessId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{ControlResponse, RemoteProcessState, RemoteProcessSummary},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    if !settings.failing_processes.is_empty() {
        warn!(failing = ?settings.failing_processes, "control requests for these processes will fail");
    }
    let app = build_router(Arc::new(AppState::from_settings(&settings)));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "control server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/processes", get(list_processes))
        .route("/processes/:process_id/start", post(start_process))
        .route("/processes/:process_id/stop", post(stop_process))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_processes(State(state): State<Arc<AppState>>) -> Json<Vec<RemoteProcessSummary>> {
    Json(state.processes.read().await.values().cloned().collect())
}

async fn start_process(
    State(state): State<Arc<AppState>>,
    Path(process_id): Path<String>,
) -> Result<Json<ControlResponse>, (StatusCode, Json<ApiError>)> {
    control(&state, ProcessId::from(process_id), ControlAction::Start)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn stop_process(
    State(state): State<Arc<AppState>>,
    Path(process_id): Path<String>,
) -> Result<Json<ControlResponse>, (StatusCode, Json<ApiError>)> {
    control(&state, ProcessId::from(process_id), ControlAction::Stop)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn control(
    state: &AppState,
    process_id: ProcessId,
    action: ControlAction,
) -> Result<ControlResponse, ApiException> {
    if process_id.as_str().trim().is_empty() {
        return Err(ApiException::new(ErrorCode::Validation, "process id is empty"));
    }
    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }
    if state.failing.contains(&process_id) {
        warn!(%process_id, %action, "control request refused");
        return Err(ApiException::new(
            ErrorCode::ControlFailed,
            format!("process {process_id} could not {action}"),
        ));
    }

    let remote_state = match action {
        ControlAction::Start => RemoteProcessState::Started,
        ControlAction::Stop => RemoteProcessState::Stopped,
    };
    state.processes.write().await.insert(
        process_id.clone(),
        RemoteProcessSummary {
            process_id: process_id.clone(),
            state: remote_state,
            updated_at: Utc::now(),
        },
    );
    info!(%process_id, %action, "control request applied");
    Ok(ControlResponse::ok(process_id, action))
}

fn error_response(err: ApiException) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::ControlFailed | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err.into()))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
