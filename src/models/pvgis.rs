use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ─── Yield data returned by PVGIS PVcalc ─────────────────────────────────────

/// Annual aggregate of a PVcalc run, optionally scaled by a site shading factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct YieldTotals {
    /// Yearly energy production (kWh)
    #[serde(rename = "E_y")]
    pub e_y: f64,
    /// Year-to-year standard deviation of `E_y` (kWh)
    #[serde(rename = "SD_y")]
    pub sd_y: f64,
    /// Yearly in-plane irradiation (kWh/m²)
    #[serde(rename = "H_i_y")]
    pub h_i_y: f64,
    /// Total system loss (%)
    pub l_total: f64,
    /// Levelised cost of PV electricity, only when PVGIS was given a price
    #[serde(rename = "LCOE_pv")]
    pub lcoe_pv: Option<f64>,
}

impl YieldTotals {
    /// Same totals with the annual yield replaced.
    pub fn with_annual_kwh(&self, e_y: f64) -> Self {
        Self { e_y, ..*self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyPoint {
    /// Calendar month, 1..=12
    pub month: u32,
    #[serde(rename = "E_m")]
    pub e_m: f64,
    #[serde(rename = "SD_m")]
    pub sd_m: f64,
    #[serde(rename = "H_i_m")]
    pub h_i_m: f64,
}

/// Parsed PVcalc response: the echoed inputs plus the yield series.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PvgisYield {
    #[schema(value_type = Object)]
    pub inputs: serde_json::Value,
    pub monthly: Vec<MonthlyPoint>,
    pub totals: YieldTotals,
}

/// Site shading category applied on top of the PVGIS estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AreaType {
    Rural,
    Suburban,
    Urban,
}

impl AreaType {
    /// Unknown names map to `None`, which callers treat as "no adjustment".
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "rural" => Some(Self::Rural),
            "suburban" => Some(Self::Suburban),
            "urban" => Some(Self::Urban),
            _ => None,
        }
    }

    pub fn shading_factor(self) -> f64 {
        match self {
            Self::Rural => 1.0,
            Self::Suburban => 0.92,
            Self::Urban => 0.85,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rural => "rural",
            Self::Suburban => "suburban",
            Self::Urban => "urban",
        }
    }
}
