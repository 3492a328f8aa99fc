use crate::constants;
use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub metrics: MetricsConfig,
    pub crypto: CryptoConfig,
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(constants::DEFAULT_DATABASE_PATH),
            busy_timeout_ms: constants::DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 0 or negative runs once and exits.
    pub interval_seconds: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub api_url: String,
    pub coins: Vec<String>,
    pub vs_currency: String,
    pub timeout_seconds: u64,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            api_url: constants::COINGECKO_API.to_string(),
            coins: constants::DEFAULT_COINS.iter().map(|c| c.to_string()).collect(),
            vs_currency: constants::DEFAULT_VS_CURRENCY.to_string(),
            timeout_seconds: constants::DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: constants::OPEN_METEO_API.to_string(),
            latitude: constants::DEFAULT_LATITUDE,
            longitude: constants::DEFAULT_LONGITUDE,
            timezone: constants::DEFAULT_TIMEZONE.to_string(),
            timeout_seconds: constants::DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl EtlConfig {
    /// Defaults, then the TOML file, then environment overrides.
    ///
    /// An explicit `path` must exist; without one, `etl.toml` in the working
    /// directory is read only when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let implicit = Path::new(constants::DEFAULT_CONFIG_FILE);
                if implicit.exists() {
                    Self::from_file(implicit)?
                } else {
                    debug!("No {} found, starting from defaults", constants::DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: EtlConfig = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Applies environment-style overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ETL_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = get("ETL_INTERVAL_SECONDS") {
            self.schedule.interval_seconds = parse_var("ETL_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = get("ETL_METRICS_PORT") {
            self.metrics.port = Some(parse_var("ETL_METRICS_PORT", &v)?);
        }
        if let Some(v) = get("ETL_HTTP_TIMEOUT_SECONDS") {
            let secs: u64 = parse_var("ETL_HTTP_TIMEOUT_SECONDS", &v)?;
            self.crypto.timeout_seconds = secs;
            self.weather.timeout_seconds = secs;
        }
        if let Some(v) = get("CRYPTO_COINS") {
            self.crypto.coins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("CRYPTO_VS_CURRENCY") {
            self.crypto.vs_currency = v.trim().to_string();
        }
        if let Some(v) = get("COINGECKO_API_URL") {
            self.crypto.api_url = v;
        }
        if let Some(v) = get("CITY_LATITUDE") {
            self.weather.latitude = parse_var("CITY_LATITUDE", &v)?;
        }
        if let Some(v) = get("CITY_LONGITUDE") {
            self.weather.longitude = parse_var("CITY_LONGITUDE", &v)?;
        }
        if let Some(v) = get("WEATHER_TIMEZONE") {
            self.weather.timezone = v.trim().to_string();
        }
        if let Some(v) = get("OPEN_METEO_API_URL") {
            self.weather.api_url = v;
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| EtlError::Config(format!("{key}={raw:?} is not valid: {e}")))
}
