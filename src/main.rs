use clap::{Parser, Subcommand};
use etl_portfolio::config::{DatabaseConfig, EtlConfig};
use etl_portfolio::pipeline::{run_once, run_scheduled, CryptoPricePipeline, EtlPipeline, Schedule, WeatherPipeline};
use etl_portfolio::{logging, metrics};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "etl_portfolio")]
#[command(about = "Idempotent ETL jobs for crypto prices and daily weather")]
#[command(version)]
struct Cli {
    /// Optional TOML config; defaults to ./etl.toml when present
    #[arg(long, env = "ETL_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load CoinGecko spot prices into crypto_prices
    Crypto,
    /// Load Open-Meteo hourly forecasts as daily aggregates into daily_weather
    Weather,
}

async fn drive<P: EtlPipeline>(pipeline: &P, database: &DatabaseConfig, schedule: Schedule) -> anyhow::Result<()> {
    if let Schedule::Every(interval) = schedule {
        info!("Starting scheduled {} ETL every {} seconds", pipeline.name(), interval.as_secs());
    }
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available: run until killed.
            std::future::pending::<()>().await;
        }
    };
    run_scheduled(schedule, shutdown, move || run_once(pipeline, database)).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = EtlConfig::load(cli.config.as_deref())?;
    metrics::init_metrics(config.metrics.port);
    let schedule = Schedule::from_interval_seconds(config.schedule.interval_seconds);

    match cli.command {
        Commands::Crypto => {
            let pipeline = CryptoPricePipeline::from_config(&config.crypto)?;
            drive(&pipeline, &config.database, schedule).await?;
        }
        Commands::Weather => {
            let pipeline = WeatherPipeline::from_config(&config.weather)?;
            drive(&pipeline, &config.database, schedule).await?;
        }
    }
    Ok(())
}
