//! Yield-uncertainty risk sampling.
//!
//! Annual yield is drawn from `N(E_y, SD_y)` (clamped at zero) and each draw
//! is pushed through the cashflow engine. The random source is injected so
//! tests and seeded requests are reproducible.

use std::f64::consts::PI;

use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;

use super::cashflow::compute_finance;
use crate::models::pvgis::YieldTotals;
use crate::models::simulation::EconomicsParams;

pub const DEFAULT_TRIALS: usize = 2000;
pub const HISTOGRAM_BINS: usize = 20;

/// Smallest first uniform draw fed to `ln` in Box–Muller.
const MIN_UNIFORM: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonteCarloOptions {
    pub n_trials: usize,
    pub target_payback_years: Option<f64>,
}

impl Default for MonteCarloOptions {
    fn default() -> Self {
        Self {
            n_trials: DEFAULT_TRIALS,
            target_payback_years: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Percentiles {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct PaybackDistribution {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_under_target: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HistogramBins {
    pub payback: Histogram,
    pub npv: Histogram,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MonteCarloResult {
    pub n_trials: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_payback_years: Option<f64>,
    pub payback: PaybackDistribution,
    pub npv: Percentiles,
    pub histogram_bins: HistogramBins,
}

/// Standard normal variate via Box–Muller, consuming two uniform draws.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let mut u1: f64 = rng.gen_range(0.0..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    if u1 <= 0.0 {
        u1 = MIN_UNIFORM;
    }
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Linear-interpolated percentile of an ascending sample, `p` in 0..=1.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = p * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (idx - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Equal-width histogram spanning the sample's min and max.
///
/// A constant sample collapses into a single bin with edges `[v, v]`.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    if values.is_empty() || bins == 0 {
        return Histogram {
            edges: vec![0.0; bins + 1],
            counts: vec![0; bins],
        };
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return Histogram {
            edges: vec![min, min],
            counts: vec![values.len()],
        };
    }

    let range = max - min;
    let mut counts = vec![0; bins];
    for v in values {
        let bin = (((v - min) / range) * bins as f64).floor() as usize;
        counts[bin.min(bins - 1)] += 1;
    }
    let edges = (0..=bins)
        .map(|i| min + (range * i as f64) / bins as f64)
        .collect();

    Histogram { edges, counts }
}

pub fn run_monte_carlo<R: Rng + ?Sized>(
    totals: &YieldTotals,
    economics: &EconomicsParams,
    options: &MonteCarloOptions,
    rng: &mut R,
) -> MonteCarloResult {
    let n_trials = options.n_trials;
    // internal encoding of "never pays back", only used for the statistics below
    let never_payback = f64::from(economics.analysis_years) + 1.0;

    let mut payback_samples = Vec::with_capacity(n_trials);
    let mut npv_samples = Vec::with_capacity(n_trials);

    for _ in 0..n_trials {
        let z = standard_normal(rng);
        let sampled = (totals.e_y + totals.sd_y * z).max(0.0);
        let fin = compute_finance(&totals.with_annual_kwh(sampled), economics);
        payback_samples.push(fin.payback_years.map_or(never_payback, f64::from));
        npv_samples.push(fin.npv.unwrap_or(0.0));
    }

    let mut sorted_payback = payback_samples.clone();
    sorted_payback.sort_by(f64::total_cmp);
    let mut sorted_npv = npv_samples.clone();
    sorted_npv.sort_by(f64::total_cmp);

    let prob_under_target = options.target_payback_years.map(|target| {
        if payback_samples.is_empty() {
            return 0.0;
        }
        let under = payback_samples
            .iter()
            .filter(|&&p| p <= target && p < never_payback)
            .count();
        under as f64 / payback_samples.len() as f64
    });

    MonteCarloResult {
        n_trials,
        target_payback_years: options.target_payback_years,
        payback: PaybackDistribution {
            p10: percentile(&sorted_payback, 0.1),
            p50: percentile(&sorted_payback, 0.5),
            p90: percentile(&sorted_payback, 0.9),
            prob_under_target,
        },
        npv: Percentiles {
            p10: percentile(&sorted_npv, 0.1),
            p50: percentile(&sorted_npv, 0.5),
            p90: percentile(&sorted_npv, 0.9),
        },
        histogram_bins: HistogramBins {
            payback: histogram(&payback_samples, HISTOGRAM_BINS),
            npv: histogram(&npv_samples, HISTOGRAM_BINS),
        },
    }
}
