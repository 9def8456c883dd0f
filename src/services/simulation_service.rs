use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::MonteCarloConfig;
use crate::error::{PvgisError, SimulationError};
use crate::models::simulation::{AnalyzeRequest, SimulateRequest};
use crate::services::pvgis_service::{
    PvgisClient, PvgisTool, QueryParams, azimuth_from_north_to_aspect, parse_yield,
};
use crate::simulation::monte_carlo::MonteCarloOptions;
use crate::simulation::{SimulationResult, assemble};

/// PVcalc parameters for a simulate request.
///
/// Explicit angles are only sent when optimisation is off and both are set.
pub fn pvcalc_params(request: &SimulateRequest, horizon: Option<&[f64]>) -> QueryParams {
    let pv = &request.pv;
    let explicit_angles = !pv.optimalangles && pv.angle_deg.is_some() && pv.aspect_deg.is_some();

    vec![
        ("lat", Some(request.location.lat.into())),
        ("lon", Some(request.location.lon.into())),
        ("peakpower", Some(pv.peakpower_kw.into())),
        ("loss", Some(pv.loss_percent.into())),
        ("usehorizon", Some(pv.usehorizon.into())),
        ("pvtechchoice", Some(pv.pvtechchoice.as_str().into())),
        ("mountingplace", Some(pv.mountingplace.as_str().into())),
        ("optimalangles", Some(pv.optimalangles.into())),
        ("angle", pv.angle_deg.filter(|_| explicit_angles).map(Into::into)),
        ("aspect", pv.aspect_deg.filter(|_| explicit_angles).map(Into::into)),
        ("userhorizon", horizon.map(|h| join_horizon(h).into())),
    ]
}

fn join_horizon(profile: &[f64]) -> String {
    profile
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Monte Carlo settings for one request: request values win over config.
pub fn monte_carlo_setup(request: &SimulateRequest, config: &MonteCarloConfig) -> (MonteCarloOptions, StdRng) {
    let mc = request.monte_carlo.unwrap_or_default();
    let options = MonteCarloOptions {
        n_trials: mc.n_trials.unwrap_or(config.n_trials),
        target_payback_years: mc.target_payback_years,
    };
    let rng = match mc.seed.or(config.seed) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    (options, rng)
}

/// Fetches PVGIS yield for the request and runs the full financial analysis.
///
/// A failed horizon lookup is not fatal: PVGIS falls back to its own terrain model.
/// The engine itself runs on the blocking pool.
pub async fn run_simulation(
    client: &PvgisClient,
    monte_carlo: &MonteCarloConfig,
    request: &SimulateRequest,
) -> Result<SimulationResult, SimulationError> {
    let location = &request.location;

    let horizon = if request.pv.usehorizon {
        match client.horizon_profile(location.lat, location.lon).await {
            Ok(profile) if !profile.is_empty() => Some(profile),
            Ok(_) => None,
            Err(e) => {
                warn!("[SIM] horizon lookup failed, using PVGIS terrain model: {}", e);
                None
            }
        }
    } else {
        None
    };

    let raddatabase = request
        .pv
        .raddatabase
        .as_deref()
        .map(str::trim)
        .filter(|db| !db.is_empty());

    let params = pvcalc_params(request, horizon.as_deref());
    let raw = client.call(PvgisTool::PvCalc, &params, raddatabase).await?;
    let pvgis = parse_yield(&raw);

    let (options, mut rng) = monte_carlo_setup(request, monte_carlo);
    let owned = request.clone();
    let result =
        tokio::task::spawn_blocking(move || assemble(&owned, pvgis, &options, &mut rng)).await?;

    info!(
        "[SIM] lat={:.4} lon={:.4} kWp={} | E_y={:.0} kWh | payback={:?}",
        location.lat, location.lon, request.pv.peakpower_kw, result.kpis.annual_kwh, result.finance.payback_years
    );
    Ok(result)
}

/// PVcalc parameters for the flat analyze endpoint.
///
/// Optimal angles are requested whenever tilt or azimuth is missing.
pub fn analyze_params(request: &AnalyzeRequest) -> QueryParams {
    let mut params: QueryParams = vec![
        ("lat", Some(request.lat.into())),
        ("lon", Some(request.lon.into())),
        ("peakpower", Some(request.peakpower_kwp.into())),
        ("loss", Some(request.loss_pct.into())),
        ("usehorizon", Some(request.usehorizon.into())),
    ];

    match (request.optimalangles, request.tilt_deg, request.azimuth_from_north_deg) {
        (false, Some(tilt), Some(azimuth)) => {
            params.push(("angle", Some(tilt.into())));
            params.push(("aspect", Some(azimuth_from_north_to_aspect(azimuth).into())));
        }
        _ => params.push(("optimalangles", Some(true.into()))),
    }
    params
}

/// Raw PVcalc passthrough: `{ inputs, results }`.
pub async fn analyze(client: &PvgisClient, request: &AnalyzeRequest) -> Result<Value, PvgisError> {
    let raddatabase = request.radiation_database.map(|db| db.as_str());
    let results = client
        .call(PvgisTool::PvCalc, &analyze_params(request), raddatabase)
        .await?;
    Ok(json!({ "inputs": request, "results": results }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PvgisConfig;
    use crate::services::pvgis_service::QueryValue;
    use crate::services::response_cache::ResponseCache;
    use mockito::{Matcher, Server};
    use rand::RngCore;
    use std::time::Duration;

    fn simulate_request(extra_pv: Value) -> SimulateRequest {
        let mut pv = json!({ "peakpower_kw": 5.0 });
        if let (Some(pv), Some(extra)) = (pv.as_object_mut(), extra_pv.as_object()) {
            pv.extend(extra.clone());
        }
        serde_json::from_value(json!({
            "location": { "lat": 45.0, "lon": 8.0 },
            "pv": pv,
            "economics": { "capex": 6000.0, "price_buy": 0.25 },
            "monte_carlo": { "n_trials": 100, "seed": 5 }
        }))
        .unwrap()
    }

    fn value_of<'a>(params: &'a QueryParams, key: &str) -> Option<&'a QueryValue> {
        params.iter().find(|(k, _)| *k == key).and_then(|(_, v)| v.as_ref())
    }

    fn client(base_url: String) -> PvgisClient {
        let config = PvgisConfig {
            base_url,
            max_attempts: 1,
            retry_base_ms: 1,
            min_interval_ms: 0,
            ..PvgisConfig::default()
        };
        PvgisClient::new(&config, ResponseCache::memory_only(10, Duration::from_secs(60))).unwrap()
    }

    #[test]
    fn explicit_angles_need_both_values_and_no_optimisation() {
        let req = simulate_request(json!({ "optimalangles": false, "angle_deg": 30.0, "aspect_deg": -10.0 }));
        let params = pvcalc_params(&req, None);
        assert_eq!(value_of(&params, "angle"), Some(&QueryValue::Number(30.0)));
        assert_eq!(value_of(&params, "aspect"), Some(&QueryValue::Number(-10.0)));
        assert_eq!(value_of(&params, "optimalangles"), Some(&QueryValue::Bool(false)));
        assert_eq!(value_of(&params, "userhorizon"), None);

        let req = simulate_request(json!({ "optimalangles": false, "angle_deg": 30.0 }));
        assert_eq!(value_of(&pvcalc_params(&req, None), "angle"), None);

        let req = simulate_request(json!({ "angle_deg": 30.0, "aspect_deg": 0.0 }));
        assert_eq!(value_of(&pvcalc_params(&req, None), "aspect"), None);
    }

    #[test]
    fn horizon_is_sent_comma_joined() {
        let req = simulate_request(json!({}));
        let params = pvcalc_params(&req, Some(&[1.5, 0.0, 12.25][..]));
        assert_eq!(value_of(&params, "userhorizon"), Some(&QueryValue::Text("1.5,0,12.25".into())));
        assert_eq!(value_of(&params, "pvtechchoice"), Some(&QueryValue::Text("crystSi".into())));
    }

    #[test]
    fn analyze_converts_compass_azimuth() {
        let req: AnalyzeRequest = serde_json::from_value(json!({
            "lat": 45.0, "lon": 8.0, "peakpower_kwp": 3.0,
            "tilt_deg": 35.0, "azimuth_from_north_deg": 135.0
        }))
        .unwrap();
        let params = analyze_params(&req);
        assert_eq!(value_of(&params, "angle"), Some(&QueryValue::Number(35.0)));
        assert_eq!(value_of(&params, "aspect"), Some(&QueryValue::Number(-45.0)));
        assert_eq!(value_of(&params, "optimalangles"), None);
        assert_eq!(value_of(&params, "loss"), Some(&QueryValue::Number(14.0)));
    }

    #[test]
    fn analyze_falls_back_to_optimal_angles() {
        let req: AnalyzeRequest = serde_json::from_value(json!({
            "lat": 45.0, "lon": 8.0, "peakpower_kwp": 3.0, "tilt_deg": 35.0
        }))
        .unwrap();
        let params = analyze_params(&req);
        assert_eq!(value_of(&params, "optimalangles"), Some(&QueryValue::Bool(true)));
        assert_eq!(value_of(&params, "angle"), None);
    }

    #[test]
    fn request_settings_override_config() {
        let req = simulate_request(json!({}));
        let config = MonteCarloConfig { n_trials: 2000, seed: Some(1) };
        let (options, _) = monte_carlo_setup(&req, &config);
        assert_eq!(options.n_trials, 100);

        let mut plain = req.clone();
        plain.monte_carlo = None;
        let (options, _) = monte_carlo_setup(&plain, &config);
        assert_eq!(options.n_trials, 2000);
        assert_eq!(options.target_payback_years, None);
    }

    #[test]
    fn request_seed_overrides_config_seed() {
        let req = simulate_request(json!({}));
        let config = MonteCarloConfig { n_trials: 2000, seed: Some(1) };

        let (_, mut first) = monte_carlo_setup(&req, &config);
        let (_, mut second) = monte_carlo_setup(&req, &config);
        let draws: Vec<u64> = (0..4).map(|_| first.next_u64()).collect();
        assert_eq!(draws, (0..4).map(|_| second.next_u64()).collect::<Vec<_>>());

        let mut request_seeded = StdRng::seed_from_u64(5);
        assert_eq!(draws, (0..4).map(|_| request_seeded.next_u64()).collect::<Vec<_>>());

        let mut plain = req.clone();
        plain.monte_carlo = None;
        let (_, mut from_config) = monte_carlo_setup(&plain, &config);
        let mut config_seeded = StdRng::seed_from_u64(1);
        assert_eq!(from_config.next_u64(), config_seeded.next_u64());
    }

    #[tokio::test]
    async fn simulation_survives_horizon_failure() {
        let mut server = Server::new_async().await;
        let horizon = server
            .mock("GET", "/api/v5_3/printhorizon")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;
        let pvcalc = server
            .mock("GET", "/api/v5_3/PVcalc")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("peakpower".into(), "5".into()),
                Matcher::UrlEncoded("usehorizon".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "inputs": {},
                    "outputs": { "totals": { "fixed": { "E_y": 6000.0, "SD_y": 300.0 } } }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let result = run_simulation(&client(server.url()), &MonteCarloConfig::default(), &simulate_request(json!({})))
            .await
            .unwrap();

        assert_eq!(result.kpis.annual_kwh, 6000.0);
        assert_eq!(result.monte_carlo.n_trials, 100);
        horizon.assert_async().await;
        pvcalc.assert_async().await;
    }

    #[tokio::test]
    async fn pvcalc_failure_is_reported() {
        let mut server = Server::new_async().await;
        let _pvcalc = server
            .mock("GET", "/api/v5_3/PVcalc")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let req = simulate_request(json!({ "usehorizon": false }));
        let err = run_simulation(&client(server.url()), &MonteCarloConfig::default(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::Pvgis(ref e) if e.status() == Some(500)), "{err}");
    }

    #[tokio::test]
    async fn analyze_wraps_raw_response() {
        let mut server = Server::new_async().await;
        let _pvcalc = server
            .mock("GET", "/api/v5_2/PVcalc")
            .match_query(Matcher::UrlEncoded("raddatabase".into(), "PVGIS-NSRDB".into()))
            .with_status(200)
            .with_body(r#"{"outputs":{"totals":{"fixed":{"E_y":1234}}}}"#)
            .create_async()
            .await;

        let req: AnalyzeRequest = serde_json::from_value(json!({
            "lat": 40.0, "lon": -100.0, "peakpower_kwp": 1.0, "radiation_database": "PVGIS-NSRDB"
        }))
        .unwrap();
        let body = analyze(&client(server.url()), &req).await.unwrap();

        assert_eq!(body["inputs"]["peakpower_kwp"], 1.0);
        assert_eq!(body["inputs"]["want_tmy"], true);
        assert_eq!(body["inputs"]["want_daily"], false);
        assert!(body["inputs"].get("startyear").is_none());
        assert_eq!(body["results"]["outputs"]["totals"]["fixed"]["E_y"], 1234);
    }
}
