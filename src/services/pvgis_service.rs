use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PvgisConfig;
use crate::error::PvgisError;
use crate::models::pvgis::{MonthlyPoint, PvgisYield, YieldTotals};
use crate::services::response_cache::ResponseCache;

const NSRDB_DATABASE: &str = "PVGIS-NSRDB";
const NSRDB_API_VERSION: &str = "v5_2";
const MAX_BACKOFF: Duration = Duration::from_secs(10);

// ─── Query building ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvgisTool {
    PvCalc,
    PrintHorizon,
}

impl PvgisTool {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PvCalc => "PVcalc",
            Self::PrintHorizon => "printhorizon",
        }
    }
}

/// Query parameter value; booleans go out as `1`/`0`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for QueryValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Ordered query parameters; `None` values are dropped when the URL is built.
pub type QueryParams = Vec<(&'static str, Option<QueryValue>)>;

/// `{base}/api/{version}/{tool}?...` with `outputformat=json&browser=0` forced last.
pub fn build_url(
    base_url: &str,
    api_version: &str,
    tool: PvgisTool,
    params: &[(&'static str, Option<QueryValue>)],
    raddatabase: Option<&str>,
) -> Result<Url, PvgisError> {
    let version = if raddatabase == Some(NSRDB_DATABASE) {
        NSRDB_API_VERSION
    } else {
        api_version
    };
    let endpoint = format!("{}/api/{}/{}", base_url.trim_end_matches('/'), version, tool.as_str());

    let mut pairs: Vec<(&str, String)> = params
        .iter()
        .filter(|(key, _)| !matches!(*key, "outputformat" | "browser" | "raddatabase"))
        .filter_map(|(key, value)| value.as_ref().map(|v| (*key, v.to_string())))
        .collect();
    if let Some(db) = raddatabase {
        pairs.push(("raddatabase", db.to_owned()));
    }
    pairs.push(("outputformat", "json".to_owned()));
    pairs.push(("browser", "0".to_owned()));

    Url::parse_with_params(&endpoint, &pairs).map_err(|e| PvgisError::InvalidUrl(e.to_string()))
}

/// Compass azimuth (0=N, 90=E, 180=S) to PVGIS aspect (0=S, -90=E, 90=W).
pub fn azimuth_from_north_to_aspect(azimuth_from_north_deg: f64) -> f64 {
    let mut aspect = azimuth_from_north_deg - 180.0;
    if aspect > 180.0 {
        aspect -= 360.0;
    }
    if aspect < -180.0 {
        aspect += 360.0;
    }
    aspect
}

// ─── Rate limiting ───────────────────────────────────────────────────────────

/// Caps requests in flight and spaces out their start times.
struct RateLimiter {
    permits: Semaphore,
    next_start: Mutex<Instant>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent),
            next_start: Mutex::new(Instant::now()),
            min_interval,
        }
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, PvgisError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PvgisError::LimiterClosed)?;

        let mut next_start = self.next_start.lock().await;
        let now = Instant::now();
        if *next_start > now {
            tokio::time::sleep_until(*next_start).await;
        }
        *next_start = (*next_start).max(now) + self.min_interval;

        Ok(permit)
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct PvgisClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    max_attempts: u32,
    retry_base: Duration,
    limiter: RateLimiter,
    cache: ResponseCache,
}

impl PvgisClient {
    pub fn new(config: &PvgisConfig, cache: ResponseCache) -> Result<Self, PvgisError> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_version: config.api_version.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_base: config.retry_base(),
            limiter: RateLimiter::new(config.max_concurrent.max(1), config.min_interval()),
            cache,
        })
    }

    pub fn url_for(
        &self,
        tool: PvgisTool,
        params: &[(&'static str, Option<QueryValue>)],
        raddatabase: Option<&str>,
    ) -> Result<Url, PvgisError> {
        build_url(&self.base_url, &self.api_version, tool, params, raddatabase)
    }

    /// Single entry point to PVGIS: cache first, then the network with retries.
    pub async fn call(
        &self,
        tool: PvgisTool,
        params: &[(&'static str, Option<QueryValue>)],
        raddatabase: Option<&str>,
    ) -> Result<Value, PvgisError> {
        let url = self.url_for(tool, params, raddatabase)?;
        self.fetch_json(url).await
    }

    /// Horizon elevation angles (`H_hor`) around the site, in PVGIS order.
    pub async fn horizon_profile(&self, lat: f64, lon: f64) -> Result<Vec<f64>, PvgisError> {
        let params: QueryParams = vec![("lat", Some(lat.into())), ("lon", Some(lon.into()))];
        let response = self.call(PvgisTool::PrintHorizon, &params, None).await?;
        Ok(parse_horizon(&response))
    }

    async fn fetch_json(&self, url: Url) -> Result<Value, PvgisError> {
        if let Some((value, hit)) = self.cache.get(url.as_str()) {
            #[cfg(feature = "verbose_log")]
            debug!("[PVGIS] cache {:?} hit: {}", hit, url);
            #[cfg(not(feature = "verbose_log"))]
            let _ = hit;
            return Ok(value);
        }

        let mut attempt = 0;
        loop {
            match self.request_once(&url).await {
                Ok(value) => {
                    self.cache.put(url.as_str(), &value);
                    return Ok(value);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt < self.max_attempts && e.is_retriable() {
                        let backoff = self.backoff(attempt);
                        warn!(
                            "[PVGIS] attempt {}/{} failed ({}), retrying in {:?}",
                            attempt, self.max_attempts, e, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    warn!(
                        "[PVGIS] giving up on {} after {} attempt(s), status {:?}: {}",
                        url, attempt, e.status(), e
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn request_once(&self, url: &Url) -> Result<Value, PvgisError> {
        let _permit = self.limiter.acquire().await?;
        debug!("[PVGIS] GET {}", url);

        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PvgisError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_base.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

// ─── Response parsing ────────────────────────────────────────────────────────

/// Numeric coercion for loosely typed PVGIS fields; anything unusable is 0.
fn num(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_finite() { n } else { 0.0 }
}

/// First key present in `object`.
fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| object.get(*k))
}

/// `outputs.<section>.fixed`, falling back to `outputs.<section>`.
fn output_section<'a>(response: &'a Value, section: &str) -> Option<&'a Value> {
    let outputs = response.get("outputs")?.get(section)?;
    Some(outputs.get("fixed").unwrap_or(outputs))
}

pub fn parse_monthly(response: &Value) -> Vec<MonthlyPoint> {
    let Some(rows) = output_section(response, "monthly").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut monthly: Vec<MonthlyPoint> = rows
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|row| {
            let month = num(row.get("month"));
            if !(1.0..=12.0).contains(&month) || month.fract() != 0.0 {
                return None;
            }
            Some(MonthlyPoint {
                month: month as u32,
                e_m: num(field(row, &["E_m"])),
                sd_m: num(field(row, &["SD_m"])),
                h_i_m: num(field(row, &["H(i)_m", "H_i_m"])),
            })
        })
        .collect();
    monthly.sort_by_key(|m| m.month);
    monthly
}

pub fn parse_totals(response: &Value) -> YieldTotals {
    let empty = Map::new();
    let totals = output_section(response, "totals")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let lcoe_pv = match field(totals, &["LCOE_pv"]) {
        None | Some(Value::Null) => None,
        raw => Some(num(raw)),
    };

    YieldTotals {
        e_y: num(field(totals, &["E_y"])),
        sd_y: num(field(totals, &["SD_y"])),
        h_i_y: num(field(totals, &["H(i)_y", "H_i_y"])),
        l_total: num(field(totals, &["l_total"])),
        lcoe_pv,
    }
}

/// Splits a raw PVcalc response into inputs, monthly series and totals.
pub fn parse_yield(response: &Value) -> PvgisYield {
    PvgisYield {
        inputs: response.get("inputs").cloned().unwrap_or(Value::Null),
        monthly: parse_monthly(response),
        totals: parse_totals(response),
    }
}

fn parse_horizon(response: &Value) -> Vec<f64> {
    response
        .pointer("/outputs/horizon_profile")
        .and_then(Value::as_array)
        .map(|points| {
            points
                .iter()
                .filter_map(Value::as_object)
                .map(|p| num(p.get("H_hor")))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn test_config(base_url: String) -> PvgisConfig {
        PvgisConfig {
            base_url,
            max_attempts: 3,
            retry_base_ms: 1,
            min_interval_ms: 0,
            ..PvgisConfig::default()
        }
    }

    fn client(base_url: String) -> PvgisClient {
        PvgisClient::new(
            &test_config(base_url),
            ResponseCache::memory_only(10, Duration::from_secs(60)),
        )
        .unwrap()
    }

    fn pvcalc_body() -> Value {
        json!({
            "inputs": { "location": { "latitude": 45.0, "longitude": 8.0 } },
            "outputs": {
                "monthly": { "fixed": [
                    { "month": 2, "E_m": 300.0, "SD_m": 20.0, "H(i)_m": 90.0 },
                    { "month": 1, "E_m": 200.0, "SD_m": 10.0, "H(i)_m": 60.0 },
                    { "month": 13, "E_m": 1.0, "SD_m": 1.0, "H(i)_m": 1.0 }
                ] },
                "totals": { "fixed": {
                    "E_y": 6000.5, "SD_y": 250.0, "H(i)_y": 1750.0, "l_total": -13.2
                } }
            }
        })
    }

    #[test]
    fn query_forces_json_output_and_drops_missing_values() {
        let params: QueryParams = vec![
            ("lat", Some(45.5.into())),
            ("peakpower", Some(5.0.into())),
            ("usehorizon", Some(true.into())),
            ("optimalangles", Some(false.into())),
            ("angle", None),
            ("browser", Some(true.into())),
        ];
        let url = build_url("https://re.jrc.ec.europa.eu/", "v5_3", PvgisTool::PvCalc, &params, None)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://re.jrc.ec.europa.eu/api/v5_3/PVcalc?lat=45.5&peakpower=5&usehorizon=1&optimalangles=0&outputformat=json&browser=0"
        );
    }

    #[test]
    fn nsrdb_pins_api_version() {
        let params: QueryParams = vec![("lat", Some(40.0.into()))];
        let url = build_url("https://pvgis", "v5_3", PvgisTool::PvCalc, &params, Some("PVGIS-NSRDB"))
            .unwrap();
        assert_eq!(url.path(), "/api/v5_2/PVcalc");
        assert!(url.as_str().contains("raddatabase=PVGIS-NSRDB&outputformat=json"));

        let url = build_url("https://pvgis", "v5_3", PvgisTool::PrintHorizon, &params, Some("PVGIS-ERA5"))
            .unwrap();
        assert_eq!(url.path(), "/api/v5_3/printhorizon");
    }

    #[test]
    fn azimuth_conversion_wraps_into_pvgis_range() {
        assert_eq!(azimuth_from_north_to_aspect(180.0), 0.0);
        assert_eq!(azimuth_from_north_to_aspect(90.0), -90.0);
        assert_eq!(azimuth_from_north_to_aspect(270.0), 90.0);
        assert_eq!(azimuth_from_north_to_aspect(0.0), -180.0);
        assert_eq!(azimuth_from_north_to_aspect(360.0), 180.0);
        assert_eq!(azimuth_from_north_to_aspect(-90.0), 90.0);
    }

    #[test]
    fn parses_fixed_sections_and_sorts_months() {
        let parsed = parse_yield(&pvcalc_body());
        let months: Vec<u32> = parsed.monthly.iter().map(|m| m.month).collect();
        assert_eq!(months, vec![1, 2]);
        assert_eq!(parsed.monthly[0].h_i_m, 60.0);
        assert_eq!(parsed.totals.e_y, 6000.5);
        assert_eq!(parsed.totals.h_i_y, 1750.0);
        assert_eq!(parsed.totals.lcoe_pv, None);
        assert_eq!(parsed.inputs["location"]["latitude"], 45.0);
    }

    #[test]
    fn parses_flat_sections_and_coerces_numbers() {
        let body = json!({
            "outputs": {
                "monthly": [ { "month": "3", "E_m": "120.5", "SD_m": null, "H_i_m": 80 } ],
                "totals": { "E_y": "oops", "SD_y": 12, "H_i_y": 900, "l_total": -14, "LCOE_pv": "0.09" }
            }
        });
        let parsed = parse_yield(&body);
        assert_eq!(parsed.monthly, vec![MonthlyPoint { month: 3, e_m: 120.5, sd_m: 0.0, h_i_m: 80.0 }]);
        assert_eq!(parsed.totals.e_y, 0.0);
        assert_eq!(parsed.totals.sd_y, 12.0);
        assert_eq!(parsed.totals.lcoe_pv, Some(0.09));
        assert_eq!(parsed.inputs, Value::Null);
    }

    #[test]
    fn missing_outputs_parse_to_empty_yield() {
        let parsed = parse_yield(&json!({ "inputs": {} }));
        assert!(parsed.monthly.is_empty());
        assert_eq!(parsed.totals.e_y, 0.0);
    }

    #[tokio::test]
    async fn call_hits_network_once_then_serves_from_cache() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v5_3/PVcalc")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("peakpower".into(), "5".into()),
                Matcher::UrlEncoded("outputformat".into(), "json".into()),
                Matcher::UrlEncoded("browser".into(), "0".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(pvcalc_body().to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client(server.url());
        let params: QueryParams = vec![("peakpower", Some(5.0.into()))];
        let first = client.call(PvgisTool::PvCalc, &params, None).await.unwrap();
        let second = client.call(PvgisTool::PvCalc, &params, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(parse_totals(&first).e_y, 6000.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_rate_limited_requests_up_to_max_attempts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v5_3/PVcalc")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("slow down")
            .expect(3)
            .create_async()
            .await;

        let client = client(server.url());
        let err = client.call(PvgisTool::PvCalc, &[], None).await.unwrap_err();

        assert_eq!(err.status(), Some(429));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v5_3/PVcalc")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"message":"bad lat"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(server.url());
        let err = client.call(PvgisTool::PvCalc, &[], None).await.unwrap_err();

        assert!(matches!(err, PvgisError::Status { status: 400, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn horizon_profile_reads_h_hor() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v5_3/printhorizon")
            .match_query(Matcher::Regex("lat=45&lon=8".into()))
            .with_status(200)
            .with_body(
                json!({ "outputs": { "horizon_profile": [
                    { "A": -180.0, "H_hor": 3.1 },
                    { "A": -172.5, "H_hor": 2.7 }
                ] } })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client(server.url());
        let profile = client.horizon_profile(45.0, 8.0).await.unwrap();

        assert_eq!(profile, vec![3.1, 2.7]);
        mock.assert_async().await;
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let client = PvgisClient::new(
            &PvgisConfig { retry_base_ms: 1000, ..PvgisConfig::default() },
            ResponseCache::memory_only(1, Duration::from_secs(1)),
        )
        .unwrap();
        assert_eq!(client.backoff(1), Duration::from_secs(2));
        assert_eq!(client.backoff(2), Duration::from_secs(4));
        assert_eq!(client.backoff(4), Duration::from_secs(10));
        assert_eq!(client.backoff(40), Duration::from_secs(10));
    }
}
