use std::net::SocketAddr;
use tracing::{info, warn};

/// Installs the Prometheus exporter when a port is configured.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else {
        return;
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}

/// Per-run counters and histograms, labelled by pipeline name
pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_run_started(pipeline: &'static str) {
        ::metrics::counter!("etl_pipeline_runs_total", "pipeline" => pipeline).increment(1);
    }

    pub fn record_extract(pipeline: &'static str, duration_secs: f64, payload_bytes: usize) {
        ::metrics::histogram!("etl_extract_duration_seconds", "pipeline" => pipeline)
            .record(duration_secs);
        ::metrics::histogram!("etl_extract_payload_bytes", "pipeline" => pipeline)
            .record(payload_bytes as f64);
    }

    pub fn record_load(pipeline: &'static str, rows: usize, duration_secs: f64) {
        ::metrics::counter!("etl_rows_loaded_total", "pipeline" => pipeline).increment(rows as u64);
        ::metrics::histogram!("etl_load_duration_seconds", "pipeline" => pipeline)
            .record(duration_secs);
    }

    pub fn record_run_success(pipeline: &'static str, duration_secs: f64) {
        ::metrics::counter!("etl_pipeline_success_total", "pipeline" => pipeline).increment(1);
        ::metrics::histogram!("etl_pipeline_duration_seconds", "pipeline" => pipeline)
            .record(duration_secs);
        ::metrics::gauge!("etl_pipeline_last_success_timestamp_seconds", "pipeline" => pipeline)
            .set(chrono::Utc::now().timestamp() as f64);
    }

    pub fn record_run_failure(pipeline: &'static str, kind: &'static str) {
        ::metrics::counter!("etl_pipeline_failures_total", "pipeline" => pipeline, "kind" => kind)
            .increment(1);
    }
}
