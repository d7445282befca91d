// GET handlers: version, stored hosts, host data, cycle report, single section

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::result_store::StoredHostData;
use crate::version::{NAME, VERSION};

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn load_host(state: &AppState, host: &str) -> Result<StoredHostData, Response> {
    match state.store.read(host).await {
        Ok(Some(data)) => Ok(data),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("no data stored for host {}", host),
        )),
        Err(e) => {
            tracing::warn!(host, error = %e, operation = "read", "Result store read failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "result store read failed".into(),
            ))
        }
    }
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/hosts: hosts with stored results, their state and last write time.
pub(super) async fn hosts_handler(State(state): State<AppState>) -> Response {
    match state.store.hosts().await {
        Ok(hosts) => Json(hosts).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, operation = "hosts", "Result store listing failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "result store read failed".into(),
            )
        }
    }
}

pub(super) async fn host_handler(
    State(state): State<AppState>,
    Path(host): Path<String>,
) -> Response {
    match load_host(&state, &host).await {
        Ok(data) => Json(data).into_response(),
        Err(resp) => resp,
    }
}

pub(super) async fn report_handler(
    State(state): State<AppState>,
    Path(host): Path<String>,
) -> Response {
    match load_host(&state, &host).await {
        Ok(data) => Json(data.report).into_response(),
        Err(resp) => resp,
    }
}

pub(super) async fn section_handler(
    State(state): State<AppState>,
    Path((host, section)): Path<(String, String)>,
) -> Response {
    let data = match load_host(&state, &host).await {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    match data.sections.get(&section) {
        Some(s) => Json(s).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("host {} has no section {}", host, section),
        ),
    }
}
