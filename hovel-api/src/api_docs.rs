use utoipa::OpenApi;

use hovel_engine::{Branch, BranchStatus, CreateBranchRequest, TerminalSession};

use crate::routes::branches::StartBranchRequest;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::status::root,
        crate::routes::status::health_check,
        crate::routes::status::api_status,
        crate::routes::branches::create_branch,
        crate::routes::branches::list_branches,
        crate::routes::branches::get_branch,
        crate::routes::branches::delete_branch,
        crate::routes::branches::start_branch,
        crate::routes::branches::stop_branch,
        crate::routes::branches::restart_branch,
        crate::routes::branches::branch_status,
        crate::routes::branches::branch_logs,
        crate::routes::branches::start_gemini_session,
    ),
    components(
        schemas(
            Branch,
            BranchStatus,
            CreateBranchRequest,
            StartBranchRequest,
            TerminalSession
        )
    ),
    tags(
        (name = "hovel", description = "Branch workspace orchestration API")
    )
)]
pub struct ApiDoc;
