use crate::config::DatabaseConfig;
use crate::error::Result;
use rusqlite::Connection;
use std::time::Duration;
use tracing::{debug, info};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_crypto_prices",
        include_str!("../migrations/001_create_crypto_prices.sql"),
    ),
    (
        "002_create_daily_weather",
        include_str!("../migrations/002_create_daily_weather.sql"),
    ),
];

/// Opens a fresh connection for one pipeline run.
///
/// The caller owns the returned connection; dropping it closes the file.
pub fn connect(config: &DatabaseConfig) -> Result<Connection> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    debug!("Opening SQLite database at {}", config.path.display());
    let conn = Connection::open(&config.path)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Creates the target tables if they are missing. Safe to run on every connect.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        conn.execute_batch(sql)?;
        debug!("Applied migration {}", name);
    }
    info!("Database schema ready ({} migrations)", MIGRATIONS.len());
    Ok(())
}
