use axum::{
    Router,
    routing::{get, post},
};

use crate::controllers::simulation_controller::{analyze, health, simulate};
use crate::shared_state::AppState;

/// Build the `/api/*` sub-router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health",     get(health))
        .route("/simulate",   post(simulate))
        .route("/pv/analyze", post(analyze))
        .with_state(state)
}
