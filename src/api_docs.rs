use utoipa::OpenApi;
use crate::controllers::simulation_controller;
use crate::models::{pvgis, simulation as request};
use crate::simulation::{self, break_even, capacity, cashflow, kpi, monte_carlo, report, sweeps};

#[derive(OpenApi)]
#[openapi(
    paths(
        simulation_controller::health,
        simulation_controller::simulate,
        simulation_controller::analyze
    ),
    components(
        schemas(
            request::SimulateRequest,
            request::AnalyzeRequest,
            request::RadiationDatabase,
            pvgis::PvgisYield,
            pvgis::AreaType,
            simulation::SimulationResult,
            cashflow::FinanceResult,
            kpi::Kpis,
            report::Insight,
            sweeps::Scenarios,
            sweeps::Sensitivity,
            monte_carlo::MonteCarloResult,
            break_even::BreakEvenResult,
            capacity::KwpOptimization
        )
    ),
    tags(
        (name = "solar-roi-sim", description = "PV yield and financial simulation API")
    )
)]
pub struct ApiDoc;
