// Read-only HTTP query API over the result store

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::result_store::ResultStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<ResultStore>,
}

pub fn app(store: Arc<ResultStore>) -> Router {
    let state = AppState { store };
    Router::new()
        .route("/", get(|| async { "checkengine query API" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/hosts", get(http::hosts_handler)) // GET /api/hosts
        .route("/api/hosts/{host}", get(http::host_handler)) // GET /api/hosts/{host}
        .route("/api/hosts/{host}/report", get(http::report_handler)) // GET /api/hosts/{host}/report
        .route(
            "/api/hosts/{host}/sections/{section}",
            get(http::section_handler),
        ) // GET /api/hosts/{host}/sections/{section}
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
