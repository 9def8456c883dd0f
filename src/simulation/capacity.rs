use serde::Serialize;
use utoipa::ToSchema;

use super::cashflow::compute_finance;
use crate::models::pvgis::YieldTotals;
use crate::models::simulation::{Consumption, CostModel, EconomicsParams};

/// Sweep bounds in kWp, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KwpRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for KwpRange {
    fn default() -> Self {
        Self { min: 1.0, max: 10.0, step: 0.5 }
    }
}

impl From<[f64; 3]> for KwpRange {
    fn from([min, max, step]: [f64; 3]) -> Self {
        Self { min, max, step }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct KwpPoint {
    pub kwp: f64,
    /// Zero when NPV is disabled
    pub npv: f64,
    pub payback_years: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct KwpOptimization {
    pub recommended_kwp_npv: f64,
    pub recommended_kwp_payback: f64,
    pub curve: Vec<KwpPoint>,
}

/// Re-sizes the system along `range`, scaling yield linearly with kWp.
///
/// Self-consumption follows from the household's daytime demand and capex
/// from the cost model. Each recommendation is the first size reaching the
/// strict optimum and falls back to `range.min`.
pub fn optimize_kwp(
    totals: &YieldTotals,
    economics: &EconomicsParams,
    peakpower_kw: f64,
    cost_model: &CostModel,
    consumption: &Consumption,
    range: KwpRange,
) -> KwpOptimization {
    let specific_yield = if peakpower_kw > 0.0 { totals.e_y / peakpower_kw } else { 0.0 };
    let daytime_kwh = consumption.annual_kwh * consumption.daytime_fraction;

    let mut curve = Vec::new();
    let mut best_npv = f64::NEG_INFINITY;
    let mut best_npv_kwp = range.min;
    let mut best_payback: Option<u32> = None;
    let mut best_payback_kwp = range.min;

    let mut evaluate = |kwp: f64| {
        let e_y = specific_yield * kwp;
        let self_consumption = if e_y > 0.0 { (daytime_kwh / e_y).min(1.0) } else { 0.0 };
        let capex = cost_model.fixed_cost + cost_model.cost_per_kwp * kwp;
        let fin = compute_finance(
            &totals.with_annual_kwh(e_y),
            &EconomicsParams { capex, self_consumption, ..*economics },
        );

        if let Some(npv) = fin.npv {
            if npv > best_npv {
                best_npv = npv;
                best_npv_kwp = kwp;
            }
        }
        if let Some(payback) = fin.payback_years {
            if best_payback.is_none_or(|best| payback < best) {
                best_payback = Some(payback);
                best_payback_kwp = kwp;
            }
        }

        curve.push(KwpPoint {
            kwp,
            npv: fin.npv.unwrap_or(0.0),
            payback_years: fin.payback_years,
        });
    };

    if range.step > 0.0 {
        let mut kwp = range.min;
        while kwp <= range.max + range.step * 0.5 {
            evaluate(kwp);
            kwp += range.step;
        }
    } else {
        evaluate(range.min);
    }

    KwpOptimization {
        recommended_kwp_npv: best_npv_kwp,
        recommended_kwp_payback: best_payback_kwp,
        curve,
    }
}
