use std::sync::Arc;

use crate::config::MonteCarloConfig;
use crate::services::pvgis_service::PvgisClient;

/// Handler state. The PVGIS client owns the cache and rate limiter, so all
/// requests share them through the `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub pvgis: Arc<PvgisClient>,
    pub monte_carlo: MonteCarloConfig,
}

impl AppState {
    pub fn new(pvgis: PvgisClient, monte_carlo: MonteCarloConfig) -> Self {
        Self {
            pvgis: Arc::new(pvgis),
            monte_carlo,
        }
    }
}
