//! Type coercion shared by the transforms.
//!
//! Nothing here substitutes a placeholder: a value that cannot be read as what
//! the column needs is an `EtlError::Parse` and fails the run.

use crate::error::{EtlError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Reads a nullable measurement as `f64`.
///
/// Absent and `null` are `None`; numbers and numeric strings are accepted.
/// A NaN that arrives as the string `"NaN"` is passed through unchanged.
pub fn coerce_measurement(field: &str, value: Option<&Value>) -> Result<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| EtlError::parse(format!("{field}: {n} does not fit in f64"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| EtlError::parse(format!("{field}: {s:?} is not numeric"))),
        Some(other) => Err(EtlError::parse(format!("{field}: {other} is not numeric"))),
    }
}

/// Reads a provider timestamp.
///
/// Epoch seconds (integer or fractional, kept to millisecond precision) are
/// UTC instants. RFC 3339 strings keep their own offset. ISO strings without an
/// offset are wall-clock times in `offset`.
pub fn parse_timestamp(field: &str, value: Option<&Value>, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let instant = match value {
        None | Some(Value::Null) => {
            return Err(EtlError::parse(format!("{field}: timestamp is missing")));
        }
        Some(Value::Number(n)) => {
            let utc = if let Some(secs) = n.as_i64() {
                DateTime::<Utc>::from_timestamp(secs, 0)
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .and_then(|f| DateTime::<Utc>::from_timestamp_millis((f * 1000.0).round() as i64))
            };
            utc.map(|dt| dt.with_timezone(&offset))
        }
        Some(Value::String(s)) => parse_iso(s.trim(), offset),
        Some(_) => None,
    };
    instant.ok_or_else(|| {
        EtlError::parse(format!(
            "{field}: {} is not a recognised timestamp",
            value.map(Value::to_string).unwrap_or_default()
        ))
    })
}

fn parse_iso(s: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// RFC 3339 in UTC with a `Z` suffix, as stored in the tables.
pub fn format_instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
