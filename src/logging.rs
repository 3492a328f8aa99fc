use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const DEFAULT_FILTER: &str = "etl_portfolio=info";

/// Initializes the logging system with both console and file output.
///
/// The returned guard flushes the file writer when dropped, so `main` keeps it
/// alive for the whole process.
pub fn init_logging() -> WorkerGuard {
    // Ensure logs directory exists
    let _ = fs::create_dir_all(LOG_DIR);

    // Daily rotation, JSON lines for the file
    let file_appender = tracing_appender::rolling::daily(LOG_DIR, "etl.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
