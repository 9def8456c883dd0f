//! Chart series and rule-based insights shown next to the numbers.

use serde::Serialize;
use utoipa::ToSchema;

use super::kpi::{Kpis, MonthEnergy};
use crate::models::pvgis::{AreaType, MonthlyPoint, YieldTotals};
use crate::models::simulation::PvSystem;

const HIGH_LOSS_PERCENT: f64 = 20.0;
const FAR_FROM_SOUTH_DEG: f64 = 90.0;
const HIGH_VARIABILITY_RATIO: f64 = 0.05;
const GREAT_SPECIFIC_YIELD: f64 = 1200.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct YearValue {
    pub year: u32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Charts {
    pub monthly_energy_kwh: Vec<MonthEnergy>,
    /// Starts at year 0 with the negative capex
    pub cashflow_cumulative: Vec<YearValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub text: String,
    /// Stable message id for client-side translation
    #[schema(value_type = String)]
    pub key: &'static str,
}

impl Insight {
    fn info(key: &'static str, text: impl Into<String>) -> Self {
        Self { kind: InsightKind::Info, text: text.into(), key }
    }

    fn warning(key: &'static str, text: impl Into<String>) -> Self {
        Self { kind: InsightKind::Warning, text: text.into(), key }
    }
}

pub fn build_charts(monthly: &[MonthlyPoint], capex: f64, cashflow_cumulative: &[f64]) -> Charts {
    let monthly_energy_kwh = monthly
        .iter()
        .map(|m| MonthEnergy { month: m.month, kwh: m.e_m })
        .collect();

    let cashflow_cumulative = std::iter::once(YearValue { year: 0, value: -capex })
        .chain(
            (1u32..)
                .zip(cashflow_cumulative)
                .map(|(year, &value)| YearValue { year, value }),
        )
        .collect();

    Charts { monthly_energy_kwh, cashflow_cumulative }
}

pub fn build_insights(
    pv: &PvSystem,
    totals: &YieldTotals,
    kpis: &Kpis,
    area: Option<AreaType>,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some(area @ (AreaType::Urban | AreaType::Suburban)) = area {
        insights.push(Insight::info(
            "insight.areaTypeShading",
            format!("Yield adjusted for {} shading (buildings/trees).", area.as_str()),
        ));
    }

    if pv.loss_percent > HIGH_LOSS_PERCENT {
        insights.push(Insight::warning(
            "insight.highLosses",
            "High system losses; check inverter sizing, cabling, and shading.",
        ));
    }

    let far_from_south = pv.aspect_deg.is_some_and(|a| a.abs() > FAR_FROM_SOUTH_DEG);
    if !pv.optimalangles && far_from_south {
        insights.push(Insight::warning(
            "insight.orientationFarFromSouth",
            "Array orientation is far from south; expect reduced energy yield.",
        ));
    }

    if totals.e_y > 0.0 && totals.sd_y / totals.e_y > HIGH_VARIABILITY_RATIO {
        insights.push(Insight::info(
            "insight.highVariability",
            "Year-to-year variability of solar resource is relatively high.",
        ));
    }

    if kpis.specific_yield_kwh_per_kwp > GREAT_SPECIFIC_YIELD {
        insights.push(Insight::info(
            "insight.greatSolarResource",
            "Great solar resource for PV at this location (high specific yield).",
        ));
    }

    insights
}
