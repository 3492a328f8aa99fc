mod common;

use chrono::{NaiveDate, TimeZone, Utc};
use common::count_rows;
use etl_portfolio::config::DatabaseConfig;
use etl_portfolio::db;
use etl_portfolio::error::{ErrorKind, EtlError};
use etl_portfolio::pipeline::crypto::PriceRow;
use etl_portfolio::pipeline::load;
use etl_portfolio::pipeline::weather::DailyWeatherRow;
use tempfile::TempDir;

fn database(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("etl.db"),
        ..DatabaseConfig::default()
    }
}

fn price(coin: &str, value: f64, run_hour: u32) -> PriceRow {
    PriceRow {
        coin_id: coin.to_string(),
        vs_currency: "usd".to_string(),
        price: Some(value),
        market_cap: Some(1e12),
        volume_24h: None,
        change_24h: Some(0.5),
        last_updated_at: Utc.timestamp_opt(1700000000, 0).unwrap(),
        ingestion_ts: Utc.with_ymd_and_hms(2024, 1, 1, run_hour, 0, 0).unwrap(),
    }
}

fn day(date: &str, latitude: f64) -> DailyWeatherRow {
    DailyWeatherRow {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        latitude,
        longitude: 2.3522,
        temp_min: Some(5.0),
        temp_max: Some(15.0),
        temp_avg: Some(10.0),
        precipitation_sum: 0.7,
        is_rainy: true,
        created_at: Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
    }
}

#[test]
fn loading_the_same_rows_twice_only_moves_the_ingestion_stamp() {
    let dir = TempDir::new().unwrap();
    let config = database(&dir);
    let mut conn = db::connect(&config).unwrap();

    assert_eq!(load(&[price("bitcoin", 50000.0, 1), price("solana", 100.0, 1)], &mut conn).unwrap(), 2);
    assert_eq!(load(&[price("bitcoin", 50000.0, 2), price("solana", 100.0, 2)], &mut conn).unwrap(), 2);
    drop(conn);

    assert_eq!(count_rows(&config.path, "crypto_prices"), 2);
    let fresh = rusqlite::Connection::open(&config.path).unwrap();
    let stamps: Vec<String> = fresh
        .prepare("SELECT DISTINCT ingestion_ts FROM crypto_prices")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(stamps, vec!["2024-01-01T02:00:00Z".to_string()]);
}

#[test]
fn a_different_observation_time_is_a_new_key() {
    let dir = TempDir::new().unwrap();
    let config = database(&dir);
    let mut conn = db::connect(&config).unwrap();

    let mut later = price("bitcoin", 50100.0, 2);
    later.last_updated_at = Utc.timestamp_opt(1700000060, 0).unwrap();
    load(&[price("bitcoin", 50000.0, 1)], &mut conn).unwrap();
    load(&[later], &mut conn).unwrap();

    assert_eq!(count_rows(&config.path, "crypto_prices"), 2);
}

#[test]
fn one_bad_row_leaves_nothing_from_its_batch() {
    let dir = TempDir::new().unwrap();
    let config = database(&dir);
    let mut conn = db::connect(&config).unwrap();

    // Existing state that the failed batch would have overwritten
    load(&[day("2024-01-01", 48.8566)], &mut conn).unwrap();

    let mut replacement = day("2024-01-01", 48.8566);
    replacement.temp_max = Some(30.0);
    let batch = vec![replacement, day("2024-01-02", 48.8566), day("2024-01-03", 123.0)];

    let err = load(&batch, &mut conn).unwrap_err();
    assert!(matches!(err, EtlError::Constraint { .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Constraint);
    // The caller's connection is still usable after the rollback
    assert!(conn.is_autocommit());
    drop(conn);

    let fresh = rusqlite::Connection::open(&config.path).unwrap();
    let (rows, max): (i64, f64) = fresh
        .query_row("SELECT COUNT(*), MAX(temp_max) FROM daily_weather", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(max, 15.0);
}

#[test]
fn blank_coin_id_violates_the_price_table() {
    let dir = TempDir::new().unwrap();
    let config = database(&dir);
    let mut conn = db::connect(&config).unwrap();

    let err = load(&[price("bitcoin", 1.0, 1), price("", 2.0, 1)], &mut conn).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    drop(conn);
    assert_eq!(count_rows(&config.path, "crypto_prices"), 0);
}

#[test]
fn empty_batch_returns_zero() {
    let dir = TempDir::new().unwrap();
    let config = database(&dir);
    let mut conn = db::connect(&config).unwrap();

    assert_eq!(load::<PriceRow>(&[], &mut conn).unwrap(), 0);
    assert_eq!(load::<DailyWeatherRow>(&[], &mut conn).unwrap(), 0);
}
