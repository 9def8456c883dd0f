use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

fn default_bind_address() -> String { "0.0.0.0".to_owned() }
fn default_port() -> u16 { 3000 }

fn default_base_url() -> String { "https://re.jrc.ec.europa.eu".to_owned() }
fn default_api_version() -> String { "v5_3".to_owned() }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_attempts() -> u32 { 5 }
fn default_retry_base_ms() -> u64 { 1000 }
fn default_max_concurrent() -> usize { 4 }
fn default_min_interval_ms() -> u64 { 60 }

fn default_memory_capacity() -> usize { 500 }
fn default_ttl_secs() -> u64 { 24 * 60 * 60 }
fn default_db_path() -> Option<String> { Some("./data/pvgis_cache.db".to_owned()) }

fn default_n_trials() -> usize { 2000 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pvgis: PvgisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub monte_carlo: MonteCarloConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PvgisConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Used for every radiation database except NSRDB, which is pinned to v5_2
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// `null` keeps the cache in memory only
    #[serde(default = "default_db_path")]
    pub db_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonteCarloConfig {
    #[serde(default = "default_n_trials")]
    pub n_trials: usize,
    /// Fixed seed for every request that does not bring its own
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PvgisConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            max_concurrent: default_max_concurrent(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            ttl_secs: default_ttl_secs(),
            db_path: default_db_path(),
        }
    }
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_trials: default_n_trials(),
            seed: None,
        }
    }
}

impl PvgisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {path}"))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// `PORT` overrides `server.port`.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {port}"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.pvgis.max_attempts == 0 {
            bail!("pvgis.max_attempts must be at least 1");
        }
        if self.pvgis.max_concurrent == 0 {
            bail!("pvgis.max_concurrent must be at least 1");
        }
        if self.monte_carlo.n_trials == 0 {
            bail!("monte_carlo.n_trials must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_object_takes_all_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.pvgis.api_version, "v5_3");
        assert_eq!(config.pvgis.max_attempts, 5);
        assert_eq!(config.pvgis.min_interval(), Duration::from_millis(60));
        assert_eq!(config.cache.memory_capacity, 500);
        assert_eq!(config.cache.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.monte_carlo.n_trials, 2000);
        assert_eq!(config.monte_carlo.seed, None);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let file = write_config(
            r#"{ "pvgis": { "base_url": "http://localhost:9000" }, "cache": { "db_path": null } }"#,
        );
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.pvgis.base_url, "http://localhost:9000");
        assert_eq!(config.pvgis.timeout(), Duration::from_secs(30));
        assert_eq!(config.cache.db_path, None);
    }

    #[test]
    fn rejects_zero_attempts() {
        let file = write_config(r#"{ "pvgis": { "max_attempts": 0 } }"#);
        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/config.json").is_err());
    }
}
