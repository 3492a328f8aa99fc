use crate::constants::MAX_ROWS_PER_STATEMENT;
use crate::error::{EtlError, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use tracing::{debug, info};

/// A row that can be written with `INSERT ... ON CONFLICT (key) DO UPDATE`.
///
/// `KEY_COLUMNS` must match a UNIQUE constraint on `TABLE`; `values()` returns
/// one value per entry of `COLUMNS`, in the same order.
pub trait UpsertRow {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    const KEY_COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<SqlValue>;
}

/// Builds the upsert for `rows` rows with numbered placeholders.
///
/// Every non-key column is overwritten with the incoming value on conflict.
pub fn build_upsert_sql<R: UpsertRow>(rows: usize) -> String {
    let width = R::COLUMNS.len();
    let tuples: Vec<String> = (0..rows)
        .map(|r| {
            let slots: Vec<String> = (1..=width).map(|c| format!("?{}", r * width + c)).collect();
            format!("({})", slots.join(", "))
        })
        .collect();
    let updates: Vec<String> = R::COLUMNS
        .iter()
        .filter(|c| !R::KEY_COLUMNS.contains(*c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    format!(
        "INSERT INTO {table} ({columns}) VALUES {tuples} ON CONFLICT ({keys}) DO UPDATE SET {updates}",
        table = R::TABLE,
        columns = R::COLUMNS.join(", "),
        tuples = tuples.join(", "),
        keys = R::KEY_COLUMNS.join(", "),
        updates = updates.join(", "),
    )
}

/// Upserts the batch inside one transaction and returns the number of rows submitted.
///
/// An empty batch touches nothing. Any failing row rolls back the whole batch;
/// the connection stays open and belongs to the caller.
pub fn load<R: UpsertRow>(rows: &[R], conn: &mut Connection) -> Result<usize> {
    if rows.is_empty() {
        info!("No data to load into {}", R::TABLE);
        return Ok(0);
    }

    let values: Vec<Vec<SqlValue>> = rows.iter().map(UpsertRow::values).collect();
    reject_nan::<R>(&values)?;

    let tx = conn.transaction()?;
    for chunk in values.chunks(MAX_ROWS_PER_STATEMENT) {
        let sql = build_upsert_sql::<R>(chunk.len());
        let params: Vec<&SqlValue> = chunk.iter().flatten().collect();
        debug!("Upserting {} rows into {}", chunk.len(), R::TABLE);
        tx.execute(&sql, params_from_iter(params.iter()))
            .map_err(|e| classify(R::TABLE, e))?;
    }
    tx.commit().map_err(|e| classify(R::TABLE, e))?;

    info!("Loaded {} rows into {}", rows.len(), R::TABLE);
    Ok(rows.len())
}

/// SQLite stores a bound NaN as NULL, which would pass a corrupted measurement
/// off as a missing one.
fn reject_nan<R: UpsertRow>(values: &[Vec<SqlValue>]) -> Result<()> {
    for (row, row_values) in values.iter().enumerate() {
        for (column, value) in R::COLUMNS.iter().zip(row_values) {
            if matches!(value, SqlValue::Real(v) if v.is_nan()) {
                return Err(EtlError::Constraint {
                    table: R::TABLE.to_string(),
                    message: format!("{column} is NaN in row {row}"),
                });
            }
        }
    }
    Ok(())
}

fn classify(table: &str, err: rusqlite::Error) -> EtlError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            EtlError::Constraint {
                table: table.to_string(),
                message: message.clone().unwrap_or_else(|| failure.to_string()),
            }
        }
        _ => EtlError::Database(err),
    }
}
