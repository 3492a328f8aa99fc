use crate::apis::open_meteo::{ForecastQuery, OpenMeteoClient, RawHourlyObservation};
use crate::config::WeatherConfig;
use crate::constants::{RAINY_DAY_THRESHOLD_MM, WEATHER_PIPELINE};
use crate::error::{EtlError, Result};
use crate::metrics::PipelineMetrics;
use crate::pipeline::normalize::{coerce_measurement, format_instant, parse_timestamp};
use crate::pipeline::{EtlPipeline, UpsertRow};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// One coerced hourly slot.
///
/// `local_date` is the calendar day in the provider's requested timezone and is
/// what the daily aggregate groups on.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyReading {
    pub observed_at: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
}

/// Daily aggregate keyed by (date, latitude, longitude)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyWeatherRow {
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_avg: Option<f64>,
    pub precipitation_sum: f64,
    pub is_rainy: bool,
    pub created_at: DateTime<Utc>,
}

impl UpsertRow for DailyWeatherRow {
    const TABLE: &'static str = "daily_weather";
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "latitude",
        "longitude",
        "temp_min",
        "temp_max",
        "temp_avg",
        "precipitation_sum",
        "is_rainy",
        "created_at",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["date", "latitude", "longitude"];

    fn values(&self) -> Vec<SqlValue> {
        let real = |v: Option<f64>| v.map(SqlValue::Real).unwrap_or(SqlValue::Null);
        vec![
            SqlValue::Text(self.date.format("%Y-%m-%d").to_string()),
            SqlValue::Real(self.latitude),
            SqlValue::Real(self.longitude),
            real(self.temp_min),
            real(self.temp_max),
            real(self.temp_avg),
            SqlValue::Real(self.precipitation_sum),
            SqlValue::Integer(i64::from(self.is_rainy)),
            SqlValue::Text(format_instant(&self.created_at)),
        ]
    }
}

/// Coerces raw slots; a non-numeric value or unreadable time fails the batch.
pub fn normalize_hourly(observations: Vec<RawHourlyObservation>) -> Result<Vec<HourlyReading>> {
    observations
        .into_iter()
        .enumerate()
        .map(|(i, obs)| {
            let offset = FixedOffset::east_opt(obs.utc_offset_seconds).ok_or_else(|| {
                EtlError::parse(format!("utc_offset_seconds {} is out of range", obs.utc_offset_seconds))
            })?;
            let local = parse_timestamp(&format!("hourly.time[{i}]"), Some(&obs.time), offset)?;
            Ok(HourlyReading {
                observed_at: local.with_timezone(&Utc),
                local_date: local.date_naive(),
                latitude: obs.latitude,
                longitude: obs.longitude,
                temperature: coerce_measurement(
                    &format!("hourly.temperature_2m[{i}]"),
                    Some(&obs.temperature_2m),
                )?,
                precipitation: coerce_measurement(
                    &format!("hourly.precipitation[{i}]"),
                    Some(&obs.precipitation),
                )?,
            })
        })
        .collect()
}

#[derive(Debug)]
struct DayAccumulator {
    latitude: f64,
    longitude: f64,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    temp_sum: f64,
    temp_count: usize,
    precipitation_sum: f64,
}

impl DayAccumulator {
    fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            temp_min: None,
            temp_max: None,
            temp_sum: 0.0,
            temp_count: 0,
            precipitation_sum: 0.0,
        }
    }

    fn push(&mut self, reading: &HourlyReading) {
        if let Some(t) = reading.temperature {
            self.temp_min = Some(self.temp_min.map_or(t, |m| nan_aware(m, t, f64::min)));
            self.temp_max = Some(self.temp_max.map_or(t, |m| nan_aware(m, t, f64::max)));
            self.temp_sum += t;
            self.temp_count += 1;
        }
        if let Some(p) = reading.precipitation {
            self.precipitation_sum += p;
        }
    }
}

// f64::min/max skip a NaN operand; here a NaN reading poisons the aggregate like it does the sum.
fn nan_aware(a: f64, b: f64, pick: fn(f64, f64) -> f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        pick(a, b)
    }
}

/// Groups readings by (local date, latitude, longitude) into daily rows.
///
/// Null temperatures are left out of min/max/mean (all null gives `None`);
/// null precipitation is left out of the sum. Rows come back in date order.
pub fn aggregate_daily(readings: &[HourlyReading], created_at: DateTime<Utc>) -> Vec<DailyWeatherRow> {
    let mut days: BTreeMap<(NaiveDate, u64, u64), DayAccumulator> = BTreeMap::new();
    for reading in readings {
        let key = (
            reading.local_date,
            reading.latitude.to_bits(),
            reading.longitude.to_bits(),
        );
        days.entry(key)
            .or_insert_with(|| DayAccumulator::new(reading.latitude, reading.longitude))
            .push(reading);
    }

    days.into_iter()
        .map(|((date, _, _), acc)| {
            let temp_avg = (acc.temp_count > 0).then(|| acc.temp_sum / acc.temp_count as f64);
            DailyWeatherRow {
                date,
                latitude: acc.latitude,
                longitude: acc.longitude,
                temp_min: acc.temp_min,
                temp_max: acc.temp_max,
                temp_avg,
                precipitation_sum: acc.precipitation_sum,
                is_rainy: acc.precipitation_sum > RAINY_DAY_THRESHOLD_MM,
                created_at,
            }
        })
        .collect()
}

pub struct WeatherPipeline {
    client: OpenMeteoClient,
    query: ForecastQuery,
}

impl WeatherPipeline {
    pub fn new(client: OpenMeteoClient, query: ForecastQuery) -> Self {
        Self { client, query }
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self> {
        let query = ForecastQuery::new(config.latitude, config.longitude, &config.timezone)?;
        let client = OpenMeteoClient::new(
            config.api_url.clone(),
            Duration::from_secs(config.timeout_seconds),
        )?;
        Ok(Self::new(client, query))
    }

    pub fn query(&self) -> &ForecastQuery {
        &self.query
    }
}

#[async_trait]
impl EtlPipeline for WeatherPipeline {
    type Record = RawHourlyObservation;
    type Row = DailyWeatherRow;

    fn name(&self) -> &'static str {
        WEATHER_PIPELINE
    }

    async fn extract(&self) -> Result<Vec<RawHourlyObservation>> {
        let (observations, payload) = self.client.fetch_hourly(&self.query).await?;
        PipelineMetrics::record_extract(self.name(), payload.elapsed.as_secs_f64(), payload.size_bytes);
        Ok(observations)
    }

    fn transform(
        &self,
        records: Vec<RawHourlyObservation>,
        ingested_at: DateTime<Utc>,
    ) -> Result<Vec<DailyWeatherRow>> {
        let readings = normalize_hourly(records)?;
        let rows = aggregate_daily(&readings, ingested_at);
        debug!("Aggregated {} hourly readings into {} days", readings.len(), rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
    }

    fn observation(time: &str, temperature: Value, precipitation: Value) -> RawHourlyObservation {
        RawHourlyObservation {
            time: json!(time),
            utc_offset_seconds: 0,
            latitude: 48.8566,
            longitude: 2.3522,
            temperature_2m: temperature,
            precipitation,
        }
    }

    fn reading(date: &str, temperature: Option<f64>, precipitation: Option<f64>) -> HourlyReading {
        let local_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        HourlyReading {
            observed_at: local_date.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            local_date,
            latitude: 48.8566,
            longitude: 2.3522,
            temperature,
            precipitation,
        }
    }

    #[test]
    fn one_day_aggregates_min_max_mean_and_sum() {
        let readings = vec![
            reading("2024-01-01", Some(10.0), Some(0.0)),
            reading("2024-01-01", Some(15.0), Some(0.3)),
            reading("2024-01-01", Some(5.0), Some(0.4)),
        ];
        let rows = aggregate_daily(&readings, created());

        assert_eq!(rows.len(), 1);
        let day = &rows[0];
        assert_eq!(day.date.to_string(), "2024-01-01");
        assert_eq!(day.temp_min, Some(5.0));
        assert_eq!(day.temp_max, Some(15.0));
        assert_eq!(day.temp_avg, Some(10.0));
        assert!((day.precipitation_sum - 0.7).abs() < 1e-9);
        assert!(day.is_rainy);
        assert_eq!(day.created_at, created());
    }

    #[test]
    fn threshold_is_strictly_greater_than_half_a_millimetre() {
        let rows = aggregate_daily(
            &[reading("2024-01-01", Some(1.0), Some(0.25)), reading("2024-01-01", Some(1.0), Some(0.25))],
            created(),
        );
        assert_eq!(rows[0].precipitation_sum, 0.5);
        assert!(!rows[0].is_rainy);
    }

    #[test]
    fn days_are_partitioned_and_ordered() {
        let readings = vec![
            reading("2024-01-02", Some(2.0), Some(1.0)),
            reading("2024-01-01", Some(1.0), None),
            reading("2024-01-02", Some(4.0), None),
        ];
        let rows = aggregate_daily(&readings, created());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date.to_string(), "2024-01-01");
        assert_eq!(rows[0].precipitation_sum, 0.0);
        assert_eq!(rows[1].temp_avg, Some(3.0));
        assert!(rows[1].is_rainy);
    }

    #[test]
    fn all_null_temperatures_leave_aggregates_empty() {
        let rows = aggregate_daily(&[reading("2024-01-01", None, Some(0.1))], created());
        assert_eq!(rows[0].temp_min, None);
        assert_eq!(rows[0].temp_max, None);
        assert_eq!(rows[0].temp_avg, None);
    }

    #[test]
    fn nan_temperature_propagates() {
        let rows = aggregate_daily(
            &[reading("2024-01-01", Some(f64::NAN), None), reading("2024-01-01", Some(3.0), None)],
            created(),
        );
        assert!(rows[0].temp_min.unwrap().is_nan());
        assert!(rows[0].temp_max.unwrap().is_nan());
        assert!(rows[0].temp_avg.unwrap().is_nan());
    }

    #[test]
    fn local_midnight_groups_by_provider_day() {
        let mut late = observation("2024-01-01T23:00", json!(1.0), json!(0.0));
        let mut early = observation("2024-01-02T00:00", json!(2.0), json!(0.0));
        late.utc_offset_seconds = 3600;
        early.utc_offset_seconds = 3600;

        let readings = normalize_hourly(vec![late, early]).unwrap();
        assert_eq!(readings[0].local_date.to_string(), "2024-01-01");
        assert_eq!(readings[1].local_date.to_string(), "2024-01-02");
        assert_eq!(format_instant(&readings[1].observed_at), "2024-01-01T23:00:00Z");
    }

    #[test]
    fn non_numeric_temperature_fails() {
        let err = normalize_hourly(vec![observation("2024-01-01T00:00", json!("warm"), json!(0.0))])
            .unwrap_err();
        assert!(matches!(err, EtlError::Parse(_)));
    }

    #[test]
    fn row_values_encode_date_and_flag() {
        let rows = aggregate_daily(&[reading("2024-01-01", Some(1.0), Some(0.9))], created());
        let values = rows[0].values();
        assert_eq!(values.len(), DailyWeatherRow::COLUMNS.len());
        assert_eq!(values[0], SqlValue::Text("2024-01-01".into()));
        assert_eq!(values[7], SqlValue::Integer(1));
        assert_eq!(values[8], SqlValue::Text("2024-03-01T06:00:00Z".into()));
    }
}
