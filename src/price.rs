// ===============================
// src/price.rs
// ===============================
use std::str::FromStr;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::config::TrackedToken;
use crate::domain::PriceMap;
use crate::rpc::{FetchError, RetryPolicy};

/// `{"data": {"<mint>": {"price": "0.0123"}}}`; unknown mints come back as null.
#[derive(Debug, Default, Deserialize)]
pub struct PriceResponse {
    #[serde(default)]
    pub data: Option<HashMap<String, Option<PriceEntry>>>,
}

#[derive(Debug, Deserialize)]
pub struct PriceEntry {
    pub price: Option<String>,
}

fn parse_price(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)).ok()
}

/// Tracked symbol -> price; anything missing, unparsable or negative is 0.
pub fn parse_prices(rsp: &PriceResponse, tracked: &[TrackedToken]) -> PriceMap {
    tracked
        .iter()
        .map(|t| {
            let price = rsp
                .data
                .as_ref()
                .and_then(|d| d.get(&t.mint))
                .and_then(|e| e.as_ref())
                .and_then(|e| e.price.as_deref())
                .and_then(parse_price)
                .filter(|p| *p >= Decimal::ZERO)
                .unwrap_or(Decimal::ZERO);
            (t.symbol.clone(), price)
        })
        .collect()
}

#[derive(Clone)]
pub struct PriceClient {
    http: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl PriceClient {
    pub fn new(url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.to_string(), retry })
    }

    async fn fetch_once(&self, ids: &str) -> Result<PriceResponse, FetchError> {
        let rsp = self
            .http
            .get(&self.url)
            .query(&[("ids", ids)])
            .send()
            .await?
            .error_for_status()?;
        Ok(rsp.json::<PriceResponse>().await?)
    }

    pub async fn fetch(&self, tracked: &[TrackedToken]) -> Result<PriceMap, FetchError> {
        let ids = tracked.iter().map(|t| t.mint.as_str()).collect::<Vec<_>>().join(",");
        let rsp = self.retry.run("price", || self.fetch_once(&ids)).await?;
        let prices = parse_prices(&rsp, tracked);
        debug!(?prices, "prices");
        Ok(prices)
    }
}
