use crate::models::pvgis::{AreaType, MonthlyPoint, YieldTotals};

/// Scales energy and its deviation by the site shading factor.
///
/// Irradiation (`H_i_*`), losses and LCOE are passed through untouched.
/// `None` means no adjustment.
pub fn apply_site_shading(
    totals: &YieldTotals,
    monthly: &[MonthlyPoint],
    area: Option<AreaType>,
) -> (YieldTotals, Vec<MonthlyPoint>) {
    let factor = area.map_or(1.0, AreaType::shading_factor);

    let totals = YieldTotals {
        e_y: totals.e_y * factor,
        sd_y: totals.sd_y * factor,
        ..*totals
    };
    let monthly = monthly
        .iter()
        .map(|m| MonthlyPoint {
            e_m: m.e_m * factor,
            sd_m: m.sd_m * factor,
            ..*m
        })
        .collect();

    (totals, monthly)
}
