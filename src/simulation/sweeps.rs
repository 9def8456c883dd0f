//! Discrete scenarios and 1D/2D sensitivity grids.
//!
//! Every point is an independent cashflow run on a copy of the base
//! economics with one or two fields overridden; yield stays fixed.

use serde::Serialize;
use utoipa::ToSchema;

use super::cashflow::compute_finance;
use crate::models::pvgis::YieldTotals;
use crate::models::simulation::EconomicsParams;

pub const SELF_CONSUMPTION_SCENARIOS: [f64; 3] = [0.3, 0.5, 0.7];
pub const PRICE_BUY_SCENARIO_FACTORS: [f64; 3] = [0.8, 1.0, 1.2];

const ONE_D_PRICE_RANGE: (f64, f64) = (0.5, 1.5);
const ONE_D_POINTS: usize = 11;
const TWO_D_PRICE_RANGE: (f64, f64) = (0.6, 1.4);
const TWO_D_SELF_CONSUMPTION_RANGE: (f64, f64) = (0.2, 0.9);
const TWO_D_POINTS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SweepVariable {
    PriceBuy,
    SelfConsumption,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SelfConsumptionScenario {
    pub self_consumption: f64,
    pub payback_years: Option<u32>,
    pub npv: Option<f64>,
    pub savings_year1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PriceBuyScenario {
    pub price_buy: f64,
    pub payback_years: Option<u32>,
    pub npv: Option<f64>,
    pub savings_year1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Scenarios {
    pub by_self_consumption: Vec<SelfConsumptionScenario>,
    pub by_price_buy: Vec<PriceBuyScenario>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OneDSensitivity {
    pub variable: SweepVariable,
    pub values: Vec<f64>,
    pub payback_years: Vec<Option<u32>>,
    pub npv: Vec<Option<f64>>,
}

/// Grids are indexed `[x_index][y_index]`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TwoDSensitivity {
    pub variable_x: SweepVariable,
    pub variable_y: SweepVariable,
    pub x_axis: Vec<f64>,
    pub y_axis: Vec<f64>,
    pub payback_grid: Vec<Vec<Option<u32>>>,
    pub npv_grid: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Sensitivity {
    pub one_d: OneDSensitivity,
    pub two_d: TwoDSensitivity,
}

/// Evenly spaced values from `min` to `max` inclusive.
pub fn linspace(min: f64, max: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let last = (count - 1) as f64;
            (0..count)
                .map(|i| min + (max - min) * (i as f64 / last))
                .collect()
        }
    }
}

pub fn build_scenarios(totals: &YieldTotals, economics: &EconomicsParams) -> Scenarios {
    let by_self_consumption = SELF_CONSUMPTION_SCENARIOS
        .iter()
        .map(|&self_consumption| {
            let fin = compute_finance(totals, &EconomicsParams { self_consumption, ..*economics });
            SelfConsumptionScenario {
                self_consumption,
                payback_years: fin.payback_years,
                npv: fin.npv,
                savings_year1: fin.savings_year1,
            }
        })
        .collect();

    let base_price = economics.price_buy;
    let by_price_buy = PRICE_BUY_SCENARIO_FACTORS
        .iter()
        .map(|factor| {
            let price_buy = base_price * factor;
            let fin = compute_finance(totals, &EconomicsParams { price_buy, ..*economics });
            PriceBuyScenario {
                price_buy,
                payback_years: fin.payback_years,
                npv: fin.npv,
                savings_year1: fin.savings_year1,
            }
        })
        .collect();

    Scenarios { by_self_consumption, by_price_buy }
}

pub fn build_sensitivity(totals: &YieldTotals, economics: &EconomicsParams) -> Sensitivity {
    let base_price = economics.price_buy;

    let values = linspace(
        base_price * ONE_D_PRICE_RANGE.0,
        base_price * ONE_D_PRICE_RANGE.1,
        ONE_D_POINTS,
    );
    let mut payback_years = Vec::with_capacity(values.len());
    let mut npv = Vec::with_capacity(values.len());
    for &price_buy in &values {
        let fin = compute_finance(totals, &EconomicsParams { price_buy, ..*economics });
        payback_years.push(fin.payback_years);
        npv.push(fin.npv);
    }
    let one_d = OneDSensitivity {
        variable: SweepVariable::PriceBuy,
        values,
        payback_years,
        npv,
    };

    let x_axis = linspace(
        base_price * TWO_D_PRICE_RANGE.0,
        base_price * TWO_D_PRICE_RANGE.1,
        TWO_D_POINTS,
    );
    let y_axis = linspace(
        TWO_D_SELF_CONSUMPTION_RANGE.0,
        TWO_D_SELF_CONSUMPTION_RANGE.1,
        TWO_D_POINTS,
    );
    let mut payback_grid = Vec::with_capacity(x_axis.len());
    let mut npv_grid = Vec::with_capacity(x_axis.len());
    for &price_buy in &x_axis {
        let mut payback_row = Vec::with_capacity(y_axis.len());
        let mut npv_row = Vec::with_capacity(y_axis.len());
        for &self_consumption in &y_axis {
            let fin = compute_finance(
                totals,
                &EconomicsParams { price_buy, self_consumption, ..*economics },
            );
            payback_row.push(fin.payback_years);
            npv_row.push(fin.npv);
        }
        payback_grid.push(payback_row);
        npv_grid.push(npv_row);
    }
    let two_d = TwoDSensitivity {
        variable_x: SweepVariable::PriceBuy,
        variable_y: SweepVariable::SelfConsumption,
        x_axis,
        y_axis,
        payback_grid,
        npv_grid,
    };

    Sensitivity { one_d, two_d }
}
