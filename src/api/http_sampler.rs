use super::MarketSampler;
use crate::config::SamplerSettings;
use crate::models::Sample;
use crate::Result;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const INITIAL_BACKOFF_MS: u64 = 500;

type SamplerRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Price feeds disagree on whether numbers are quoted
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn value(self) -> Result<f64> {
        match self {
            Numeric::Number(n) => Ok(n),
            Numeric::Text(s) => Ok(s.trim().parse()?),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: Numeric,
}

#[derive(Debug, Deserialize)]
struct VolumeResponse {
    volume: Numeric,
}

/// Samples price and volume from two JSON endpoints
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct HttpSampler {
    client: Client,
    price_url: String,
    volume_url: String,
    max_retries: u32,
    rate_limiter: Arc<SamplerRateLimiter>,
}

impl HttpSampler {
    pub fn new(settings: &SamplerSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let rpm = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            price_url: settings.price_url.clone(),
            volume_url: settings.volume_url.clone(),
            max_retries: settings.max_retries.max(1),
            rate_limiter,
        })
    }

    pub async fn fetch_price(&self) -> Result<f64> {
        let response: PriceResponse = self.get_with_retry(&self.price_url).await?;
        response.price.value()
    }

    pub async fn fetch_volume(&self) -> Result<f64> {
        let response: VolumeResponse = self.get_with_retry(&self.volume_url).await?;
        response.volume.value()
    }

    async fn get_with_retry<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.get_once(url).await {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::info!("✓ Fetched {} after {} attempts", url, attempt);
                    }
                    return Ok(body);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay_ms = backoff_ms(attempt);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {}. Retrying in {}ms...",
                            attempt,
                            self.max_retries,
                            url,
                            e,
                            delay_ms
                        );
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| "All retry attempts failed".into()))
    }

    async fn get_once<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {} from {}", status, url).into());
        }

        Ok(response.json().await?)
    }
}

/// Exponential backoff after failed `attempt` (1-based), saturating
fn backoff_ms(attempt: u32) -> u64 {
    2_u64
        .checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| INITIAL_BACKOFF_MS.saturating_mul(factor))
}

#[async_trait]
impl MarketSampler for HttpSampler {
    async fn sample(&self) -> anyhow::Result<Sample> {
        let (price, volume) = tokio::try_join!(self.fetch_price(), self.fetch_volume())
            .map_err(|e| anyhow::anyhow!("market sample failed: {}", e))?;
        Ok(Sample::new(price, volume))
    }
}
