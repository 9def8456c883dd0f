use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ValidationError;

// ─── Defaults (mirrors the public API contract) ──────────────────────────────

fn default_loss_percent() -> f64 { 14.0 }
fn default_true() -> bool { true }
fn default_self_consumption() -> f64 { 0.5 }
fn default_degradation() -> f64 { 0.005 }
fn default_analysis_years() -> u32 { 25 }
fn default_discount_rate() -> f64 { 0.06 }

pub const MAX_PEAKPOWER_KW: f64 = 1000.0;
pub const MAX_MONTE_CARLO_TRIALS: usize = 100_000;
pub const MAX_KWP_POINTS: f64 = 1000.0;

// ─── POST /api/simulate ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SimulateRequest {
    pub location: Location,
    pub pv: PvSystem,
    pub economics: EconomicsParams,
    #[serde(default)]
    pub cost_model: Option<CostModel>,
    #[serde(default)]
    pub consumption: Option<Consumption>,
    /// `[min_kwp, max_kwp, step]`
    #[serde(default)]
    #[schema(value_type = Option<Vec<f64>>)]
    pub kwp_range: Option<[f64; 3]>,
    #[serde(default)]
    pub monte_carlo: Option<MonteCarloRequest>,
    #[serde(default)]
    pub break_even: Option<BreakEvenRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    /// `rural`, `suburban` or `urban`; anything else leaves the yield untouched.
    #[serde(default)]
    pub area_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PvSystem {
    pub peakpower_kw: f64,
    #[serde(default = "default_loss_percent")]
    pub loss_percent: f64,
    #[serde(default = "default_true")]
    pub usehorizon: bool,
    #[serde(default = "default_true")]
    pub optimalangles: bool,
    #[serde(default)]
    pub angle_deg: Option<f64>,
    /// PVGIS convention: 0=S, 90=W, -90=E
    #[serde(default)]
    pub aspect_deg: Option<f64>,
    #[serde(default)]
    pub pvtechchoice: PvTechnology,
    #[serde(default)]
    pub mountingplace: MountingPlace,
    #[serde(default)]
    pub raddatabase: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PvTechnology {
    #[default]
    #[serde(rename = "crystSi")]
    CrystSi,
    #[serde(rename = "crystSi2025")]
    CrystSi2025,
    #[serde(rename = "CIS")]
    Cis,
    #[serde(rename = "CdTe")]
    CdTe,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl PvTechnology {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CrystSi => "crystSi",
            Self::CrystSi2025 => "crystSi2025",
            Self::Cis => "CIS",
            Self::CdTe => "CdTe",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MountingPlace {
    #[default]
    Free,
    Building,
}

impl MountingPlace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Building => "building",
        }
    }
}

/// Financial inputs of one cashflow run. Sweeps derive modified copies with
/// struct update syntax and never touch the original.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EconomicsParams {
    /// Upfront investment
    pub capex: f64,
    /// Grid purchase price per kWh in year 1
    pub price_buy: f64,
    /// Share of production consumed on site, 0..=1
    #[serde(default = "default_self_consumption")]
    pub self_consumption: f64,
    /// Feed-in price per exported kWh
    #[serde(default)]
    pub price_sell: f64,
    #[serde(default)]
    pub opex_yearly: f64,
    /// Yearly module degradation, 0..=0.1
    #[serde(default = "default_degradation")]
    pub degradation: f64,
    #[serde(default = "default_analysis_years")]
    pub analysis_years: u32,
    /// 0 disables NPV
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,
    #[serde(default)]
    pub price_escalation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CostModel {
    pub fixed_cost: f64,
    pub cost_per_kwp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Consumption {
    pub annual_kwh: f64,
    /// Share of household consumption that falls in daylight hours
    pub daytime_fraction: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonteCarloRequest {
    #[serde(default)]
    pub n_trials: Option<usize>,
    #[serde(default)]
    pub target_payback_years: Option<f64>,
    /// Fixes the sampler for reproducible results
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BreakEvenRequest {
    #[serde(default)]
    pub target_payback_years: Option<u32>,
}

impl SimulateRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = ValidationError::default();

        v.range("location.lat", self.location.lat, -90.0, 90.0);
        v.range("location.lon", self.location.lon, -180.0, 180.0);

        let pv = &self.pv;
        v.check(
            pv.peakpower_kw > 0.0 && pv.peakpower_kw <= MAX_PEAKPOWER_KW,
            "pv.peakpower_kw",
            format!("must be > 0 and <= {MAX_PEAKPOWER_KW}"),
        );
        v.range("pv.loss_percent", pv.loss_percent, 0.0, 80.0);
        if let Some(angle) = pv.angle_deg {
            v.range("pv.angle_deg", angle, 0.0, 90.0);
        }
        if let Some(aspect) = pv.aspect_deg {
            v.range("pv.aspect_deg", aspect, -180.0, 180.0);
        }

        self.economics.validate_into(&mut v);

        if let Some(cost) = &self.cost_model {
            v.non_negative("cost_model.fixed_cost", cost.fixed_cost);
            v.non_negative("cost_model.cost_per_kwp", cost.cost_per_kwp);
        }
        if let Some(consumption) = &self.consumption {
            v.non_negative("consumption.annual_kwh", consumption.annual_kwh);
            v.range("consumption.daytime_fraction", consumption.daytime_fraction, 0.0, 1.0);
        }
        if let Some([min, max, step]) = self.kwp_range {
            v.positive("kwp_range[0]", min);
            v.check(max >= min && max.is_finite(), "kwp_range[1]", "must be >= kwp_range[0]");
            v.positive("kwp_range[2]", step);
            if step > 0.0 && max >= min {
                v.check(
                    (max - min) / step <= MAX_KWP_POINTS,
                    "kwp_range",
                    format!("at most {MAX_KWP_POINTS} points"),
                );
            }
        }
        if let Some(mc) = &self.monte_carlo {
            if let Some(n) = mc.n_trials {
                v.check(
                    (1..=MAX_MONTE_CARLO_TRIALS).contains(&n),
                    "monte_carlo.n_trials",
                    format!("must be between 1 and {MAX_MONTE_CARLO_TRIALS}"),
                );
            }
            if let Some(target) = mc.target_payback_years {
                v.non_negative("monte_carlo.target_payback_years", target);
            }
        }

        v.into_result()
    }
}

impl EconomicsParams {
    fn validate_into(&self, v: &mut ValidationError) {
        v.positive("economics.capex", self.capex);
        v.positive("economics.price_buy", self.price_buy);
        v.range("economics.self_consumption", self.self_consumption, 0.0, 1.0);
        v.non_negative("economics.price_sell", self.price_sell);
        v.non_negative("economics.opex_yearly", self.opex_yearly);
        v.range("economics.degradation", self.degradation, 0.0, 0.1);
        v.check(
            (1..=40).contains(&self.analysis_years),
            "economics.analysis_years",
            "must be between 1 and 40",
        );
        v.range("economics.discount_rate", self.discount_rate, 0.0, 1.0);
        v.range("economics.price_escalation", self.price_escalation, 0.0, 1.0);
    }
}

// ─── POST /api/pv/analyze (flat PVGIS proxy) ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    pub lat: f64,
    pub lon: f64,
    pub peakpower_kwp: f64,
    #[serde(default = "default_loss_percent")]
    pub loss_pct: f64,
    #[serde(default)]
    pub tilt_deg: Option<f64>,
    /// 0=N, 90=E, 180=S, 270=W
    #[serde(default)]
    pub azimuth_from_north_deg: Option<f64>,
    #[serde(default)]
    pub optimalangles: bool,
    #[serde(default = "default_true")]
    pub usehorizon: bool,
    #[serde(default)]
    pub radiation_database: Option<RadiationDatabase>,

    // Dataset options below are validated and echoed back in `inputs` only.
    #[serde(default = "default_true")]
    pub pv_timeseries: bool,
    #[serde(default = "default_true")]
    pub components: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startyear: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endyear: Option<i32>,
    #[serde(default = "default_true")]
    pub want_tmy: bool,
    #[serde(default = "default_true")]
    pub want_monthly: bool,
    #[serde(default)]
    pub want_yearly: bool,
    #[serde(default)]
    pub want_daily: bool,
    #[serde(default)]
    pub want_horizon: bool,
}

/// First and last year covered by the PVGIS hourly series.
pub const TIMESERIES_YEARS: std::ops::RangeInclusive<i32> = 2005..=2020;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RadiationDatabase {
    #[serde(rename = "PVGIS-SARAH3")]
    Sarah3,
    #[serde(rename = "PVGIS-ERA5")]
    Era5,
    #[serde(rename = "PVGIS-NSRDB")]
    Nsrdb,
    #[serde(rename = "PVGIS-CMSAF")]
    Cmsaf,
}

impl RadiationDatabase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sarah3 => "PVGIS-SARAH3",
            Self::Era5 => "PVGIS-ERA5",
            Self::Nsrdb => "PVGIS-NSRDB",
            Self::Cmsaf => "PVGIS-CMSAF",
        }
    }
}

impl AnalyzeRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = ValidationError::default();
        v.range("lat", self.lat, -90.0, 90.0);
        v.range("lon", self.lon, -180.0, 180.0);
        v.check(
            self.peakpower_kwp > 0.0 && self.peakpower_kwp <= MAX_PEAKPOWER_KW,
            "peakpower_kwp",
            format!("must be > 0 and <= {MAX_PEAKPOWER_KW}"),
        );
        v.range("loss_pct", self.loss_pct, 0.0, 80.0);
        if let Some(tilt) = self.tilt_deg {
            v.range("tilt_deg", tilt, 0.0, 90.0);
        }
        if let Some(azimuth) = self.azimuth_from_north_deg {
            v.range("azimuth_from_north_deg", azimuth, 0.0, 360.0);
        }
        for (field, year) in [("startyear", self.startyear), ("endyear", self.endyear)] {
            if let Some(year) = year {
                v.check(
                    TIMESERIES_YEARS.contains(&year),
                    field,
                    format!("must be between {} and {}", TIMESERIES_YEARS.start(), TIMESERIES_YEARS.end()),
                );
            }
        }
        v.into_result()
    }
}
