//! Year-by-year discounted cashflow of a PV installation.
//!
//! This is the one primitive every sweep, sampler and solver in the
//! simulation module re-runs with modified inputs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::pvgis::YieldTotals;
use crate::models::simulation::EconomicsParams;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FinanceResult {
    pub savings_year1: f64,
    /// First year in which cumulative cashflow reaches zero, `None` if never within the horizon
    pub payback_years: Option<u32>,
    pub roi: Option<f64>,
    /// `None` whenever the discount rate is zero
    pub npv: Option<f64>,
    pub cashflow_yearly: Vec<f64>,
    pub cashflow_cumulative: Vec<f64>,
}

/// Runs the cashflow recurrence over `economics.analysis_years`.
///
/// Per year `t` (1-based):
///
/// * energy degrades as `E_y * (1 - degradation)^(t-1)`
/// * the buy price escalates as `price_buy * (1 + price_escalation)^(t-1)`
/// * savings are self-consumed energy at the buy price plus exported energy
///   at the sell price, minus opex
///
/// A zero discount rate yields `npv = None` rather than an undiscounted sum;
/// downstream consumers rely on that.
pub fn compute_finance(totals: &YieldTotals, economics: &EconomicsParams) -> FinanceResult {
    let years = economics.analysis_years;
    let mut cashflow_yearly = Vec::with_capacity(years as usize);
    let mut cashflow_cumulative = Vec::with_capacity(years as usize);

    let mut cumulative = -economics.capex;
    let mut sum_savings = 0.0;
    let mut npv_sum = 0.0;
    let mut payback_years = None;

    for t in 1..=years {
        let exponent = f64::from(t - 1);
        let energy = totals.e_y * (1.0 - economics.degradation).powf(exponent);
        let price_buy_t = economics.price_buy * (1.0 + economics.price_escalation).powf(exponent);

        let e_self = energy * economics.self_consumption;
        let e_export = energy - e_self;

        let savings =
            e_self * price_buy_t + e_export * economics.price_sell - economics.opex_yearly;

        sum_savings += savings;
        cashflow_yearly.push(savings);

        cumulative += savings;
        cashflow_cumulative.push(cumulative);

        if payback_years.is_none() && cumulative >= 0.0 {
            payback_years = Some(t);
        }

        if economics.discount_rate > 0.0 {
            npv_sum += savings / (1.0 + economics.discount_rate).powf(f64::from(t));
        }
    }

    let roi = if economics.capex > 0.0 {
        Some((sum_savings - economics.capex) / economics.capex)
    } else {
        None
    };

    let npv = if economics.discount_rate > 0.0 {
        Some(npv_sum - economics.capex)
    } else {
        None
    };

    FinanceResult {
        savings_year1: cashflow_yearly.first().copied().unwrap_or(0.0),
        payback_years,
        roi,
        npv,
        cashflow_yearly,
        cashflow_cumulative,
    }
}
