use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::models::simulation::{AnalyzeRequest, SimulateRequest};
use crate::services::simulation_service;
use crate::shared_state::AppState;
use crate::simulation::SimulationResult;

/// GET /api/health
/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up: `{ \"ok\": true }`")
    )
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// POST /api/simulate
/// Run a full yield and financial simulation
///
/// Fetches the PVGIS estimate for the site, applies the shading category and
/// returns KPIs, cashflow, scenarios, sensitivity grids, Monte Carlo risk,
/// break-even values and, when a cost model and consumption profile are
/// given, the system size sweep.
#[utoipa::path(
    post,
    path = "/api/simulate",
    request_body = SimulateRequest,
    responses(
        (status = 200, description = "Simulation result", body = SimulationResult),
        (status = 400, description = "Validation failed; `error` maps field paths to messages"),
        (status = 500, description = "Simulation engine failed"),
        (status = 502, description = "PVGIS call failed")
    )
)]
pub async fn simulate(
    State(state): State<AppState>,
    payload: Result<Json<SimulateRequest>, JsonRejection>,
) -> Result<Json<SimulationResult>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    request.validate()?;

    let result = simulation_service::run_simulation(&state.pvgis, &state.monte_carlo, &request).await?;
    Ok(Json(result))
}

/// POST /api/pv/analyze
/// Raw PVcalc passthrough
///
/// Takes a compass azimuth (0=N, 180=S) and returns the untouched PVGIS
/// response next to the validated input.
#[utoipa::path(
    post,
    path = "/api/pv/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "`{ inputs, results }` with the raw PVGIS JSON"),
        (status = 400, description = "Validation failed"),
        (status = 502, description = "PVGIS call failed")
    )
)]
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    request.validate()?;

    let body = simulation_service::analyze(&state.pvgis, &request)
        .await
        .map_err(|source| ApiError::Upstream {
            message: "Internal server error, PVGIS call failed",
            source,
        })?;
    Ok(Json(body))
}
