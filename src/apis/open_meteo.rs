use crate::error::{EtlError, Result};
use crate::infra::{FetchedPayload, ReqwestHttp};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, instrument};

const HOURLY_VARIABLES: &str = "temperature_2m,precipitation";

/// Location and timezone for an hourly forecast request
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

impl ForecastQuery {
    pub fn new(latitude: f64, longitude: f64, timezone: &str) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(EtlError::InvalidParams(format!(
                "latitude {latitude} is outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(EtlError::InvalidParams(format!(
                "longitude {longitude} is outside [-180, 180]"
            )));
        }
        let timezone = timezone.trim();
        if timezone.is_empty() {
            return Err(EtlError::InvalidParams("timezone must not be blank".into()));
        }
        Ok(Self {
            latitude,
            longitude,
            timezone: timezone.to_string(),
        })
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("hourly", HOURLY_VARIABLES.to_string()),
            ("timezone", self.timezone.clone()),
        ]
    }
}

/// One hourly slot from the forecast arrays, values left uncoerced.
///
/// `time` is the provider's wall-clock time in the requested timezone and
/// `utc_offset_seconds` is the offset it reported for that timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHourlyObservation {
    pub time: Value,
    pub utc_offset_seconds: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature_2m: Value,
    pub precipitation: Value,
}

pub struct OpenMeteoClient {
    http: ReqwestHttp,
    api_url: String,
}

impl OpenMeteoClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: ReqwestHttp::new(timeout)?,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    #[instrument(skip(self, query), fields(latitude = query.latitude, longitude = query.longitude))]
    pub async fn fetch_hourly(
        &self,
        query: &ForecastQuery,
    ) -> Result<(Vec<RawHourlyObservation>, FetchedPayload)> {
        let payload = self.http.get_json(&self.api_url, &query.query_params()).await?;
        let observations = parse_hourly(&payload.body, query)?;
        info!(
            "Fetched {} hourly observations ({} bytes, sha256 {})",
            observations.len(),
            payload.size_bytes,
            payload.sha256
        );
        Ok((observations, payload))
    }
}

/// Splits `{"hourly": {"time": [...], "temperature_2m": [...], "precipitation": [...]}}`
/// into one observation per index, stamped with the requested coordinates.
pub fn parse_hourly(body: &Value, query: &ForecastQuery) -> Result<Vec<RawHourlyObservation>> {
    let hourly = body
        .get("hourly")
        .and_then(Value::as_object)
        .ok_or_else(|| EtlError::parse("forecast response has no 'hourly' object"))?;

    let times = column(hourly, "time")?;
    let temperatures = column(hourly, "temperature_2m")?;
    let precipitation = column(hourly, "precipitation")?;

    if temperatures.len() != times.len() || precipitation.len() != times.len() {
        return Err(EtlError::parse(format!(
            "hourly arrays differ in length: time={}, temperature_2m={}, precipitation={}",
            times.len(),
            temperatures.len(),
            precipitation.len()
        )));
    }

    let utc_offset_seconds = match body.get("utc_offset_seconds") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| EtlError::parse(format!("utc_offset_seconds is not an integer: {v}")))?,
    };

    Ok(times
        .iter()
        .zip(temperatures)
        .zip(precipitation)
        .map(|((time, temperature), precip)| RawHourlyObservation {
            time: time.clone(),
            utc_offset_seconds,
            latitude: query.latitude,
            longitude: query.longitude,
            temperature_2m: temperature.clone(),
            precipitation: precip.clone(),
        })
        .collect())
}

fn column<'a>(hourly: &'a Map<String, Value>, name: &str) -> Result<&'a Vec<Value>> {
    hourly
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| EtlError::parse(format!("hourly.{name} is missing or not an array")))
}
