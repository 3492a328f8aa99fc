// Extract -> transform -> load, one run at a time

pub mod crypto;
pub mod loader;
pub mod normalize;
pub mod scheduler;
pub mod weather;

pub use crypto::CryptoPricePipeline;
pub use loader::{load, UpsertRow};
pub use scheduler::{run_scheduled, Schedule};
pub use weather::WeatherPipeline;

use crate::config::DatabaseConfig;
use crate::db;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// One pipeline instance: a provider, a row shape and the table it lands in.
#[async_trait]
pub trait EtlPipeline: Send + Sync {
    type Record: Send;
    type Row: UpsertRow + Send;

    /// Name used for logs and metric labels
    fn name(&self) -> &'static str;

    /// One HTTP request; any failure aborts the run before anything is written.
    async fn extract(&self) -> Result<Vec<Self::Record>>;

    /// Pure reshaping. Every row produced by one call carries `ingested_at`.
    fn transform(&self, records: Vec<Self::Record>, ingested_at: DateTime<Utc>) -> Result<Vec<Self::Row>>;
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline: &'static str,
    pub extracted: usize,
    pub loaded: usize,
    pub ingested_at: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Runs extract, transform and load once against a fresh connection.
///
/// The connection is opened after the transform succeeds and is closed when
/// this returns, whether the load committed or rolled back.
pub async fn run_once<P: EtlPipeline>(pipeline: &P, database: &DatabaseConfig) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let name = pipeline.name();
    let span = info_span!("pipeline_run", pipeline = name, %run_id);
    PipelineMetrics::record_run_started(name);
    let started = Instant::now();

    let result = execute(pipeline, database, run_id, started)
        .instrument(span.clone())
        .await;

    span.in_scope(|| match &result {
        Ok(summary) => {
            info!(
                extracted = summary.extracted,
                loaded = summary.loaded,
                "Run finished in {:.2}s",
                summary.duration_secs
            );
            PipelineMetrics::record_run_success(name, summary.duration_secs);
        }
        Err(e) => {
            error!(kind = e.kind().as_str(), "Run failed: {}", e);
            PipelineMetrics::record_run_failure(name, e.kind().as_str());
        }
    });
    result
}

async fn execute<P: EtlPipeline>(
    pipeline: &P,
    database: &DatabaseConfig,
    run_id: Uuid,
    started: Instant,
) -> Result<RunSummary> {
    info!("Extracting");
    let records = pipeline.extract().await?;
    let extracted = records.len();

    let ingested_at = Utc::now();
    let rows = pipeline.transform(records, ingested_at)?;
    info!("Transformed {} records into {} rows", extracted, rows.len());

    let mut conn = db::connect(database)?;
    let t_load = Instant::now();
    let loaded = load(&rows, &mut conn)?;
    drop(conn);
    PipelineMetrics::record_load(pipeline.name(), loaded, t_load.elapsed().as_secs_f64());

    Ok(RunSummary {
        run_id,
        pipeline: pipeline.name(),
        extracted,
        loaded,
        ingested_at,
        duration_secs: started.elapsed().as_secs_f64(),
    })
}
