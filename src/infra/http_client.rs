use crate::error::{EtlError, Result};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::debug;

/// A decoded provider response plus what we log about it
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub status: u16,
    pub body: serde_json::Value,
    pub size_bytes: usize,
    pub sha256: String,
    pub elapsed: Duration,
}

/// Thin wrapper over one `reqwest::Client` with a bounded timeout.
///
/// Exactly one GET per call; retries are left to whoever schedules the next run.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("etl_portfolio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<FetchedPayload> {
        let t0 = Instant::now();
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EtlError::Status {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        let bytes = resp.bytes().await?;
        let elapsed = t0.elapsed();

        let sha256 = {
            let mut h = Sha256::new();
            h.update(&bytes);
            hex::encode(h.finalize())
        };
        debug!(
            "GET {} -> {} ({} bytes in {:.3}s)",
            url,
            status.as_u16(),
            bytes.len(),
            elapsed.as_secs_f64()
        );

        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        Ok(FetchedPayload {
            status: status.as_u16(),
            body,
            size_bytes: bytes.len(),
            sha256,
            elapsed,
        })
    }
}
