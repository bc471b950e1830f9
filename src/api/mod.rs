pub mod http_sampler;

pub use http_sampler::HttpSampler;

use crate::models::Sample;
use async_trait::async_trait;

/// Source of the latest market observation
///
/// Values are returned as read; validation happens at ingestion.
#[async_trait]
pub trait MarketSampler: Send + Sync + 'static {
    async fn sample(&self) -> anyhow::Result<Sample>;
}
