//! Financial simulation engine.
//!
//! Everything below this module is synchronous and free of I/O: it turns one
//! PVGIS yield estimate plus a validated request into a [`SimulationResult`].
//! The only source of nondeterminism is the injected random generator.

pub mod break_even;
pub mod capacity;
pub mod cashflow;
pub mod kpi;
pub mod monte_carlo;
pub mod normalizer;
pub mod report;
pub mod sweeps;

use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::pvgis::{AreaType, PvgisYield};
use crate::models::simulation::SimulateRequest;

use break_even::{BreakEvenResult, DEFAULT_TARGET_PAYBACK_YEARS, solve_break_even};
use capacity::{KwpOptimization, KwpRange, optimize_kwp};
use cashflow::{FinanceResult, compute_finance};
use kpi::{Kpis, compute_kpis};
use monte_carlo::{MonteCarloOptions, MonteCarloResult, run_monte_carlo};
use normalizer::apply_site_shading;
use report::{Charts, Insight, build_charts, build_insights};
use sweeps::{Scenarios, Sensitivity, build_scenarios, build_sensitivity};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SimulationMeta {
    /// Shading category actually applied, `null` when absent or unrecognised
    pub area_type_applied: Option<AreaType>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SimulationResult {
    /// PVGIS yield after site shading
    pub pvgis: PvgisYield,
    pub kpis: Kpis,
    pub finance: FinanceResult,
    pub charts: Charts,
    pub insights: Vec<Insight>,
    pub meta: SimulationMeta,
    pub scenarios: Scenarios,
    pub sensitivity: Sensitivity,
    pub monte_carlo: MonteCarloResult,
    pub break_even: BreakEvenResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwp_optimization: Option<KwpOptimization>,
}

/// Runs every analysis on `raw` and collects the results.
///
/// The capacity sweep only runs when the request carries both a cost model
/// and a consumption profile.
pub fn assemble<R: Rng + ?Sized>(
    request: &SimulateRequest,
    raw: PvgisYield,
    monte_carlo: &MonteCarloOptions,
    rng: &mut R,
) -> SimulationResult {
    let economics = &request.economics;
    let pv = &request.pv;

    let area = request.location.area_type.as_deref().and_then(AreaType::parse);
    let (totals, monthly) = apply_site_shading(&raw.totals, &raw.monthly, area);

    let kpis = compute_kpis(&totals, &monthly, pv.peakpower_kw);
    let finance = compute_finance(&totals, economics);
    let charts = build_charts(&monthly, economics.capex, &finance.cashflow_cumulative);
    let insights = build_insights(pv, &totals, &kpis, area);
    let scenarios = build_scenarios(&totals, economics);
    let sensitivity = build_sensitivity(&totals, economics);
    let monte_carlo = run_monte_carlo(&totals, economics, monte_carlo, rng);

    let target = request
        .break_even
        .and_then(|b| b.target_payback_years)
        .unwrap_or(DEFAULT_TARGET_PAYBACK_YEARS);
    let break_even = solve_break_even(&totals, economics, target);

    let kwp_optimization = match (&request.cost_model, &request.consumption) {
        (Some(cost_model), Some(consumption)) => Some(optimize_kwp(
            &totals,
            economics,
            pv.peakpower_kw,
            cost_model,
            consumption,
            request.kwp_range.map(KwpRange::from).unwrap_or_default(),
        )),
        _ => None,
    };

    SimulationResult {
        pvgis: PvgisYield { inputs: raw.inputs, monthly, totals },
        kpis,
        finance,
        charts,
        insights,
        meta: SimulationMeta { area_type_applied: area },
        scenarios,
        sensitivity,
        monte_carlo,
        break_even,
        kwp_optimization,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pvgis::{MonthlyPoint, YieldTotals};
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;

    fn request(extra: serde_json::Value) -> SimulateRequest {
        let mut body = json!({
            "location": { "lat": 45.75, "lon": 21.23, "area_type": "urban" },
            "pv": { "peakpower_kw": 5.0 },
            "economics": { "capex": 6000.0, "price_buy": 0.25 }
        });
        if let (Some(base), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(body).unwrap()
    }

    fn raw_yield() -> PvgisYield {
        PvgisYield {
            inputs: json!({ "location": { "latitude": 45.75 } }),
            monthly: (1..=12)
                .map(|month| MonthlyPoint {
                    month,
                    e_m: 500.0,
                    sd_m: 40.0,
                    h_i_m: 150.0,
                })
                .collect(),
            totals: YieldTotals {
                e_y: 6000.0,
                sd_y: 300.0,
                h_i_y: 1800.0,
                l_total: -14.0,
                lcoe_pv: None,
            },
        }
    }

    fn run(req: &SimulateRequest) -> SimulationResult {
        let options = MonteCarloOptions { n_trials: 200, target_payback_years: Some(8.0) };
        assemble(req, raw_yield(), &options, &mut StdRng::seed_from_u64(11))
    }

    #[test]
    fn shading_flows_into_every_section() {
        let result = run(&request(json!({})));

        assert_eq!(result.meta.area_type_applied, Some(AreaType::Urban));
        assert_eq!(result.pvgis.totals.e_y, 6000.0 * 0.85);
        assert_eq!(result.pvgis.monthly[0].e_m, 500.0 * 0.85);
        assert_eq!(result.kpis.annual_kwh, 6000.0 * 0.85);
        assert_eq!(result.charts.cashflow_cumulative.len(), 26);
        assert_eq!(result.insights[0].key, "insight.areaTypeShading");
        assert_eq!(result.break_even.target_payback_years, DEFAULT_TARGET_PAYBACK_YEARS);
        assert_eq!(result.monte_carlo.n_trials, 200);
        assert!(result.kwp_optimization.is_none());
    }

    #[test]
    fn capacity_sweep_needs_cost_model_and_consumption() {
        let only_cost = request(json!({ "cost_model": { "fixed_cost": 1000.0, "cost_per_kwp": 900.0 } }));
        assert!(run(&only_cost).kwp_optimization.is_none());

        let both = request(json!({
            "cost_model": { "fixed_cost": 1000.0, "cost_per_kwp": 900.0 },
            "consumption": { "annual_kwh": 4500.0, "daytime_fraction": 0.4 },
            "kwp_range": [2.0, 6.0, 1.0]
        }));
        let opt = run(&both).kwp_optimization.unwrap();
        assert_eq!(opt.curve.len(), 5);
    }

    #[test]
    fn break_even_target_from_request() {
        let req = request(json!({ "break_even": { "target_payback_years": 7 } }));
        assert_eq!(run(&req).break_even.target_payback_years, 7);
    }

    #[test]
    fn unknown_area_serializes_as_null() {
        let mut req = request(json!({}));
        req.location.area_type = Some("industrial".into());
        let result = run(&req);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["meta"]["area_type_applied"], serde_json::Value::Null);
        assert_eq!(json["pvgis"]["totals"]["E_y"], 6000.0);
        assert!(json.get("kwp_optimization").is_none());
        assert_eq!(json["sensitivity"]["one_d"]["variable"], "price_buy");
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let req = request(json!({}));
        assert_eq!(run(&req).monte_carlo, run(&req).monte_carlo);
    }
}
