use serde::Serialize;
use utoipa::ToSchema;

use crate::models::pvgis::{MonthlyPoint, YieldTotals};

const HOURS_PER_YEAR: f64 = 8760.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct MonthEnergy {
    pub month: u32,
    pub kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Kpis {
    pub annual_kwh: f64,
    pub specific_yield_kwh_per_kwp: f64,
    pub capacity_factor_pct: f64,
    pub best_month: Option<MonthEnergy>,
    pub worst_month: Option<MonthEnergy>,
    pub seasonality_ratio: Option<f64>,
    pub uncertainty_annual_kwh: f64,
}

/// Informational indicators of the (normalized) yield.
///
/// Best/worst month keep the first occurrence on ties.
pub fn compute_kpis(totals: &YieldTotals, monthly: &[MonthlyPoint], peakpower_kw: f64) -> Kpis {
    let (specific_yield, capacity_factor) = if peakpower_kw > 0.0 {
        (
            totals.e_y / peakpower_kw,
            totals.e_y / (peakpower_kw * HOURS_PER_YEAR),
        )
    } else {
        (0.0, 0.0)
    };

    let mut best_month: Option<MonthEnergy> = None;
    let mut worst_month: Option<MonthEnergy> = None;
    for m in monthly {
        if best_month.is_none_or(|b| m.e_m > b.kwh) {
            best_month = Some(MonthEnergy { month: m.month, kwh: m.e_m });
        }
        if worst_month.is_none_or(|w| m.e_m < w.kwh) {
            worst_month = Some(MonthEnergy { month: m.month, kwh: m.e_m });
        }
    }

    let seasonality_ratio = match (best_month, worst_month) {
        (Some(best), Some(worst)) if worst.kwh > 0.0 => Some(best.kwh / worst.kwh),
        _ => None,
    };

    Kpis {
        annual_kwh: totals.e_y,
        specific_yield_kwh_per_kwp: specific_yield,
        capacity_factor_pct: capacity_factor * 100.0,
        best_month,
        worst_month,
        seasonality_ratio,
        uncertainty_annual_kwh: totals.sd_y,
    }
}
