//! Client for the upstream bulk price aggregator.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::models::platform::{Platform, PriceQuote};
use crate::services::retry::{retry_with, RetryPolicy};

/// Most product ids the batch endpoint accepts per request
pub const MAX_BATCH_SIZE: usize = 100;

const BATCH_PRICE_PATH: &str = "/open/cs2/v1/price/batch";

#[derive(Debug, Error)]
pub enum PriceApiError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Price API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Price API key rate limited ({code:?}): {message}")]
    RateLimited { code: Option<i64>, message: String },
    #[error("Price API error {code:?}: {message}")]
    Api { code: Option<i64>, message: String },
    #[error("Price API response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PriceApiError {
    fn is_retryable(&self) -> bool {
        match self {
            PriceApiError::Http(_) => true,
            PriceApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current per-platform prices for up to [`MAX_BATCH_SIZE`] products
    async fn fetch_batch(&self, api_key: &str, names: &[String]) -> Result<Vec<PriceQuote>, PriceApiError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchPriceResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<ItemPrices>>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemPrices {
    market_hash_name: String,
    #[serde(default)]
    data_list: Vec<PlatformPriceDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformPriceDto {
    platform: String,
    #[serde(default)]
    platform_item_id: Option<Value>, // string or number depending on platform
    #[serde(default)]
    sell_price: Option<Decimal>,
    #[serde(default)]
    sell_count: Option<i64>,
    #[serde(default)]
    bidding_price: Option<Decimal>,
    #[serde(default)]
    bidding_count: Option<i64>,
    #[serde(default)]
    update_time: Option<i64>,
}

fn item_id_string(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn clamp_count(count: Option<i64>) -> i32 {
    count.unwrap_or(0).clamp(0, i32::MAX as i64) as i32
}

/// Upstream sometimes reports milliseconds; normalise to seconds
fn epoch_seconds(ts: i64) -> i64 {
    if ts > 10_000_000_000 { ts / 1000 } else { ts }
}

/// Decode a batch response body into quotes
pub fn parse_batch_response(body: &str, rate_limit_code: i64) -> Result<Vec<PriceQuote>, PriceApiError> {
    let response: BatchPriceResponse = serde_json::from_str(body)?;

    if !response.success {
        let message = response.error_msg.unwrap_or_default();
        if response.error_code == Some(rate_limit_code) {
            return Err(PriceApiError::RateLimited {
                code: response.error_code,
                message,
            });
        }
        return Err(PriceApiError::Api {
            code: response.error_code,
            message,
        });
    }

    let mut quotes = Vec::new();
    for item in response.data.unwrap_or_default() {
        for entry in item.data_list {
            let Some(platform) = Platform::from_tag(&entry.platform) else {
                tracing::trace!("Ignoring unknown platform {}", entry.platform);
                continue;
            };

            quotes.push(PriceQuote {
                market_hash_name: item.market_hash_name.clone(),
                platform,
                platform_item_id: item_id_string(entry.platform_item_id),
                sell_price: entry.sell_price.unwrap_or_default(),
                sell_count: clamp_count(entry.sell_count),
                bidding_price: entry.bidding_price.unwrap_or_default(),
                bidding_count: clamp_count(entry.bidding_count),
                update_time: epoch_seconds(entry.update_time.unwrap_or(0)),
            });
        }
    }

    Ok(quotes)
}

#[derive(Debug, Clone)]
pub struct PriceApiConfig {
    pub base_url: String,
    pub rate_limit_code: i64,
    pub timeout: Duration,
    /// Extra attempts on transport errors and 5xx
    pub retries: u32,
}

#[derive(Clone)]
pub struct PriceApiClient {
    client: Client,
    config: PriceApiConfig,
}

impl PriceApiClient {
    pub fn new(config: PriceApiConfig) -> Result<Self, PriceApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn request_once(&self, api_key: &str, names: &[String]) -> Result<Vec<PriceQuote>, PriceApiError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), BATCH_PRICE_PATH);

        let response = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .bearer_auth(api_key)
            .json(&json!({ "marketHashNames": names }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PriceApiError::RateLimited {
                code: None,
                message: body,
            });
        }
        if !status.is_success() {
            return Err(PriceApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_batch_response(&body, self.config.rate_limit_code)
    }
}

#[async_trait]
impl PriceSource for PriceApiClient {
    async fn fetch_batch(&self, api_key: &str, names: &[String]) -> Result<Vec<PriceQuote>, PriceApiError> {
        let names = &names[..names.len().min(MAX_BATCH_SIZE)];
        tracing::debug!("Fetching batch prices for {} products", names.len());

        retry_with(
            RetryPolicy::exponential(self.config.retries + 1, Duration::from_secs(1)),
            "Batch price request",
            PriceApiError::is_retryable,
            |_| self.request_once(api_key, names),
        )
        .await
    }
}
