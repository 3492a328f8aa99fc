use crate::error::{EtlError, Result};
use crate::infra::{FetchedPayload, ReqwestHttp};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Which coins to quote and in which currency
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub coins: Vec<String>,
    pub vs_currency: String,
}

impl PriceQuery {
    /// Trims and lower-cases ids; rejects an empty list, blank ids or a blank currency.
    pub fn new<I, S>(coins: I, vs_currency: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let coins: Vec<String> = coins
            .into_iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .collect();
        if coins.is_empty() {
            return Err(EtlError::InvalidParams("at least one coin id is required".into()));
        }
        if coins.iter().any(|c| c.is_empty()) {
            return Err(EtlError::InvalidParams("coin ids must not be blank".into()));
        }
        let vs_currency = vs_currency.trim().to_lowercase();
        if vs_currency.is_empty() {
            return Err(EtlError::InvalidParams("vs_currency must not be blank".into()));
        }
        Ok(Self { coins, vs_currency })
    }

    /// Query string for `/simple/price`, always in the same order.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ids", self.coins.join(",")),
            ("vs_currencies", self.vs_currency.clone()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
            ("include_24hr_change", "true".to_string()),
            ("include_last_updated_at", "true".to_string()),
        ]
    }
}

/// One coin entry exactly as the provider sent it; coercion happens in the transform.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPriceQuote {
    pub coin_id: String,
    pub vs_currency: String,
    pub price: Option<Value>,
    pub market_cap: Option<Value>,
    pub volume_24h: Option<Value>,
    pub change_24h: Option<Value>,
    pub last_updated_at: Option<Value>,
}

pub struct CoinGeckoClient {
    http: ReqwestHttp,
    api_url: String,
}

impl CoinGeckoClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: ReqwestHttp::new(timeout)?,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    #[instrument(skip(self, query), fields(coins = query.coins.len()))]
    pub async fn fetch_prices(&self, query: &PriceQuery) -> Result<(Vec<RawPriceQuote>, FetchedPayload)> {
        let payload = self.http.get_json(&self.api_url, &query.query_params()).await?;
        let quotes = parse_simple_price(&payload.body, &query.vs_currency)?;
        if quotes.len() < query.coins.len() {
            debug!(
                "Provider returned {} of {} requested coins",
                quotes.len(),
                query.coins.len()
            );
        }
        info!(
            "Fetched {} quotes ({} bytes, sha256 {})",
            quotes.len(),
            payload.size_bytes,
            payload.sha256
        );
        Ok((quotes, payload))
    }
}

/// Parses a `{coin_id: {field: value}}` body.
///
/// Only coins present in the body produce a quote; requested coins the provider
/// left out are simply absent from the result.
pub fn parse_simple_price(body: &Value, vs_currency: &str) -> Result<Vec<RawPriceQuote>> {
    let entries = body
        .as_object()
        .ok_or_else(|| EtlError::parse("price response is not a JSON object"))?;

    let market_cap_key = format!("{vs_currency}_market_cap");
    let volume_key = format!("{vs_currency}_24h_vol");
    let change_key = format!("{vs_currency}_24h_change");

    entries
        .iter()
        .map(|(coin_id, payload)| {
            let fields = payload.as_object().ok_or_else(|| {
                EtlError::parse(format!("price entry for '{coin_id}' is not a JSON object"))
            })?;
            Ok(RawPriceQuote {
                coin_id: coin_id.clone(),
                vs_currency: vs_currency.to_string(),
                price: fields.get(vs_currency).cloned(),
                market_cap: fields.get(&market_cap_key).cloned(),
                volume_24h: fields.get(&volume_key).cloned(),
                change_24h: fields.get(&change_key).cloned(),
                last_updated_at: fields.get("last_updated_at").cloned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_is_normalized_and_validated() {
        let query = PriceQuery::new([" Bitcoin ", "ethereum"], "USD").unwrap();
        assert_eq!(query.coins, vec!["bitcoin", "ethereum"]);
        assert_eq!(query.vs_currency, "usd");

        assert!(matches!(
            PriceQuery::new(Vec::<String>::new(), "usd"),
            Err(EtlError::InvalidParams(_))
        ));
        assert!(matches!(
            PriceQuery::new(["bitcoin", "  "], "usd"),
            Err(EtlError::InvalidParams(_))
        ));
        assert!(matches!(
            PriceQuery::new(["bitcoin"], ""),
            Err(EtlError::InvalidParams(_))
        ));
    }

    #[test]
    fn query_params_are_deterministic() {
        let query = PriceQuery::new(["bitcoin", "solana"], "eur").unwrap();
        let params = query.query_params();
        assert_eq!(params[0], ("ids", "bitcoin,solana".to_string()));
        assert_eq!(params[1], ("vs_currencies", "eur".to_string()));
        assert_eq!(params.len(), 6);
        assert!(params[2..].iter().all(|(_, v)| v == "true"));
    }

    #[test]
    fn omitted_coins_are_not_in_the_output() {
        let body = json!({
            "bitcoin": {
                "usd": 50000,
                "usd_market_cap": 1e12,
                "usd_24h_vol": 2e10,
                "usd_24h_change": 1.5,
                "last_updated_at": 1700000000
            }
        });
        let quotes = parse_simple_price(&body, "usd").unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].coin_id, "bitcoin");
        assert_eq!(quotes[0].price, Some(json!(50000)));
        assert_eq!(quotes[0].change_24h, Some(json!(1.5)));
    }

    #[test]
    fn missing_fields_stay_absent() {
        let body = json!({"dogecoin": {"usd": 0.07}});
        let quotes = parse_simple_price(&body, "usd").unwrap();
        assert!(quotes[0].market_cap.is_none());
        assert!(quotes[0].last_updated_at.is_none());
    }

    #[test]
    fn empty_object_yields_no_quotes() {
        assert!(parse_simple_price(&json!({}), "usd").unwrap().is_empty());
    }

    #[test]
    fn unexpected_shapes_are_parse_errors() {
        assert!(matches!(
            parse_simple_price(&json!([1, 2]), "usd"),
            Err(EtlError::Parse(_))
        ));
        assert!(matches!(
            parse_simple_price(&json!({"bitcoin": 50000}), "usd"),
            Err(EtlError::Parse(_))
        ));
    }
}
