use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/status", get(api_status))
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner", body = Value)
    )
)]
pub async fn root() -> Json<Value> {
    Json(json!({
        "status": "running",
        "service": "hovel",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check", body = Value)
    )
)]
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Endpoint inventory", body = Value)
    )
)]
pub async fn api_status() -> Json<Value> {
    Json(json!({
        "endpoints": [
            "/",
            "/health",
            "/api/status",
            "/api/branch",
            "/api/branches",
            "/api/branch/{name}",
            "/api/branch/{name}/start",
            "/api/branch/{name}/stop",
            "/api/branch/{name}/restart",
            "/api/branch/{name}/status",
            "/api/branch/{name}/logs",
            "/api/branch/{name}/gemini-session",
        ],
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
