use crate::apis::coingecko::{CoinGeckoClient, PriceQuery, RawPriceQuote};
use crate::config::CryptoConfig;
use crate::constants::CRYPTO_PIPELINE;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::pipeline::normalize::{coerce_measurement, format_instant, parse_timestamp, utc_offset};
use crate::pipeline::{EtlPipeline, UpsertRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use std::time::Duration;

/// A normalized quote, keyed by (coin_id, vs_currency, last_updated_at)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRow {
    pub coin_id: String,
    pub vs_currency: String,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub change_24h: Option<f64>,
    pub last_updated_at: DateTime<Utc>,
    pub ingestion_ts: DateTime<Utc>,
}

impl UpsertRow for PriceRow {
    const TABLE: &'static str = "crypto_prices";
    const COLUMNS: &'static [&'static str] = &[
        "coin_id",
        "vs_currency",
        "price",
        "market_cap",
        "volume_24h",
        "change_24h",
        "last_updated_at",
        "ingestion_ts",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["coin_id", "vs_currency", "last_updated_at"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.coin_id.clone()),
            SqlValue::Text(self.vs_currency.clone()),
            real(self.price),
            real(self.market_cap),
            real(self.volume_24h),
            real(self.change_24h),
            SqlValue::Text(format_instant(&self.last_updated_at)),
            SqlValue::Text(format_instant(&self.ingestion_ts)),
        ]
    }
}

fn real(v: Option<f64>) -> SqlValue {
    v.map(SqlValue::Real).unwrap_or(SqlValue::Null)
}

/// Coerces each quote; a single bad field fails the whole batch.
pub fn transform_quotes(quotes: Vec<RawPriceQuote>, ingested_at: DateTime<Utc>) -> Result<Vec<PriceRow>> {
    quotes
        .into_iter()
        .map(|q| {
            let field = |name: &str| format!("{}.{}", q.coin_id, name);
            Ok(PriceRow {
                price: coerce_measurement(&field("price"), q.price.as_ref())?,
                market_cap: coerce_measurement(&field("market_cap"), q.market_cap.as_ref())?,
                volume_24h: coerce_measurement(&field("volume_24h"), q.volume_24h.as_ref())?,
                change_24h: coerce_measurement(&field("change_24h"), q.change_24h.as_ref())?,
                last_updated_at: parse_timestamp(
                    &field("last_updated_at"),
                    q.last_updated_at.as_ref(),
                    utc_offset(),
                )?
                .with_timezone(&Utc),
                ingestion_ts: ingested_at,
                coin_id: q.coin_id,
                vs_currency: q.vs_currency,
            })
        })
        .collect()
}

pub struct CryptoPricePipeline {
    client: CoinGeckoClient,
    query: PriceQuery,
}

impl CryptoPricePipeline {
    pub fn new(client: CoinGeckoClient, query: PriceQuery) -> Self {
        Self { client, query }
    }

    pub fn from_config(config: &CryptoConfig) -> Result<Self> {
        let query = PriceQuery::new(&config.coins, &config.vs_currency)?;
        let client = CoinGeckoClient::new(
            config.api_url.clone(),
            Duration::from_secs(config.timeout_seconds),
        )?;
        Ok(Self::new(client, query))
    }

    pub fn query(&self) -> &PriceQuery {
        &self.query
    }
}

#[async_trait]
impl EtlPipeline for CryptoPricePipeline {
    type Record = RawPriceQuote;
    type Row = PriceRow;

    fn name(&self) -> &'static str {
        CRYPTO_PIPELINE
    }

    async fn extract(&self) -> Result<Vec<RawPriceQuote>> {
        let (quotes, payload) = self.client.fetch_prices(&self.query).await?;
        PipelineMetrics::record_extract(self.name(), payload.elapsed.as_secs_f64(), payload.size_bytes);
        Ok(quotes)
    }

    fn transform(&self, records: Vec<RawPriceQuote>, ingested_at: DateTime<Utc>) -> Result<Vec<PriceRow>> {
        transform_quotes(records, ingested_at)
    }
}
