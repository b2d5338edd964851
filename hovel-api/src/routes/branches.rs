use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use hovel_engine::{Branch, CreateBranchRequest};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/branch", post(create_branch))
        .route("/api/branches", get(list_branches))
        .route(
            "/api/branch/{name}",
            get(get_branch).delete(delete_branch),
        )
        .route("/api/branch/{name}/start", post(start_branch))
        .route("/api/branch/{name}/stop", post(stop_branch))
        .route("/api/branch/{name}/restart", post(restart_branch))
        .route("/api/branch/{name}/status", get(branch_status))
        .route("/api/branch/{name}/logs", get(branch_logs))
        .route(
            "/api/branch/{name}/gemini-session",
            post(start_gemini_session),
        )
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartBranchRequest {
    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<u32>,
}

#[utoipa::path(
    post,
    path = "/api/branch",
    request_body = CreateBranchRequest,
    responses(
        (status = 200, description = "Branch created", body = Value),
        (status = 400, description = "Bad name, missing key or unknown service"),
        (status = 401, description = "Invalid Gemini API key"),
        (status = 409, description = "Branch exists"),
        (status = 503, description = "Credential provider unreachable or ports exhausted")
    )
)]
pub async fn create_branch(
    State(state): State<AppState>,
    Json(req): Json<CreateBranchRequest>,
) -> ApiResult<Json<Value>> {
    let auto_start = req.auto_start;
    let branch = state.engine.create(req).await?;

    Ok(Json(json!({
        "branch_name": branch.branch_name,
        "port": branch.port,
        "status": branch.status,
        "services": branch.services,
        "gemini_api_validated": branch.gemini_api_validated,
        "container_started": if auto_start { json!("pending") } else { json!(false) },
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/branches",
    responses(
        (status = 200, description = "All registered branches", body = Value)
    )
)]
pub async fn list_branches(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let branches = state.engine.list()?;

    Ok(Json(json!({
        "count": branches.len(),
        "branches": branches,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/branch/{name}",
    responses(
        (status = 200, description = "Branch record", body = Branch),
        (status = 404, description = "Branch not found")
    )
)]
pub async fn get_branch(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Branch>> {
    Ok(Json(state.engine.get(&name)?))
}

#[utoipa::path(
    delete,
    path = "/api/branch/{name}",
    responses(
        (status = 200, description = "Branch deleted", body = Value),
        (status = 404, description = "Branch not found")
    )
)]
pub async fn delete_branch(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    state.engine.delete(&name).await?;

    Ok(Json(json!({
        "deleted": true,
        "branch_name": name,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/branch/{name}/start",
    request_body = StartBranchRequest,
    responses(
        (status = 200, description = "Containers started", body = Value),
        (status = 400, description = "Unknown service"),
        (status = 404, description = "Branch not found"),
        (status = 500, description = "Container start failed")
    )
)]
pub async fn start_branch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<StartBranchRequest>>,
) -> ApiResult<Json<Value>> {
    let requested = body.map(|Json(b)| b.services).unwrap_or_default();
    let branch = state.engine.start(&name, &requested).await?;

    let services_started = if requested.is_empty() {
        branch.services.clone()
    } else {
        requested
    };

    Ok(Json(json!({
        "status": "running",
        "branch_name": branch.branch_name,
        "services_started": services_started,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/branch/{name}/stop",
    responses(
        (status = 200, description = "Containers stopped", body = Value),
        (status = 404, description = "Branch not found")
    )
)]
pub async fn stop_branch(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let branch = state.engine.stop(&name).await?;

    Ok(Json(json!({
        "status": "stopped",
        "branch_name": branch.branch_name,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/branch/{name}/restart",
    responses(
        (status = 200, description = "Containers restarted", body = Value),
        (status = 404, description = "Branch not found")
    )
)]
pub async fn restart_branch(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let branch = state.engine.restart(&name).await?;

    Ok(Json(json!({
        "status": "running",
        "branch_name": branch.branch_name,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/branch/{name}/status",
    responses(
        (status = 200, description = "Per-service container states", body = Value),
        (status = 404, description = "Branch not found")
    )
)]
pub async fn branch_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let report = state.engine.status(&name).await?;

    Ok(Json(json!({
        "branch_name": report.branch.branch_name,
        "port": report.branch.port,
        "status": report.branch.status,
        "container_status": report.container_status,
        "per_service": report.per_service,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/branch/{name}/logs",
    params(
        ("lines" = Option<u32>, Query, description = "Tail length, default 100")
    ),
    responses(
        (status = 200, description = "Combined container logs", body = Value),
        (status = 404, description = "Branch not found")
    )
)]
pub async fn branch_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Value>> {
    let lines = query.lines.unwrap_or(100);
    let logs = state.engine.logs(&name, lines).await?;

    Ok(Json(json!({
        "branch_name": name,
        "logs": logs,
        "lines": lines,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/branch/{name}/gemini-session",
    responses(
        (status = 200, description = "Terminal session started", body = Value),
        (status = 400, description = "Branch not running"),
        (status = 404, description = "Branch not found")
    )
)]
pub async fn start_gemini_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let (branch, session) = state.terminal.start(&name).await?;

    Ok(Json(json!({
        "branch_name": branch.branch_name,
        "ttyd_port": session.port,
        "ttyd_url": session.url.clone(),
        "access_url": session.url,
        "command": session.command,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
