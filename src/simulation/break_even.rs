use serde::Serialize;
use utoipa::ToSchema;

use super::cashflow::compute_finance;
use crate::models::pvgis::YieldTotals;
use crate::models::simulation::EconomicsParams;

pub const DEFAULT_TARGET_PAYBACK_YEARS: u32 = 10;

const PRICE_SEARCH_MIN: f64 = 0.01;
const BISECTION_ITERATIONS: usize = 50;
/// Accept the midpoint as soon as NPV is this close to zero.
const NPV_TOLERANCE: f64 = 1.0;
/// Fallback accepted after the iteration budget is spent.
const NPV_FALLBACK_TOLERANCE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct BreakEvenResult {
    /// Target horizon actually used, capped at the analysis horizon
    pub target_payback_years: u32,
    /// Largest capex recovered within the target horizon
    pub break_even_capex: Option<f64>,
    /// Buy price at which NPV is zero
    pub break_even_price_buy: Option<f64>,
}

pub fn solve_break_even(
    totals: &YieldTotals,
    economics: &EconomicsParams,
    target_payback_years: u32,
) -> BreakEvenResult {
    let fin = compute_finance(totals, economics);
    let horizon = target_payback_years.min(economics.analysis_years) as usize;
    let savings_to_target: f64 = fin.cashflow_yearly.iter().take(horizon).sum();
    let break_even_capex = (savings_to_target > 0.0).then_some(savings_to_target);

    BreakEvenResult {
        target_payback_years: horizon as u32,
        break_even_capex,
        break_even_price_buy: break_even_price(totals, economics),
    }
}

/// Bisection for the zero-NPV buy price, assuming NPV grows with price.
///
/// A disabled NPV (zero discount rate) counts as -inf, so the search walks
/// up to the bracket top and reports nothing.
fn break_even_price(totals: &YieldTotals, economics: &EconomicsParams) -> Option<f64> {
    let npv_at = |price_buy: f64| {
        compute_finance(totals, &EconomicsParams { price_buy, ..*economics })
            .npv
            .unwrap_or(f64::NEG_INFINITY)
    };

    let mut lo = PRICE_SEARCH_MIN;
    let mut hi = (economics.price_buy * 3.0).max(1.0);

    for _ in 0..BISECTION_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        let npv = npv_at(mid);
        if npv.abs() < NPV_TOLERANCE {
            return Some(mid);
        }
        if npv < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let mid = (lo + hi) / 2.0;
    (npv_at(mid).abs() < NPV_FALLBACK_TOLERANCE).then_some(mid)
}
