pub mod branches;
pub mod status;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use hovel_engine::BranchEngine;

use crate::state::AppState;

pub fn create_app(engine: BranchEngine) -> Router {
    let state = AppState::new(engine);

    // The dashboard is served from another port during development.
    let cors = CorsLayer::permissive();

    Router::new()
        .merge(status::routes())
        .merge(branches::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
