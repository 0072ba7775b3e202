use crate::domain::types::PriceSeries;
use anyhow::Result;
use async_trait::async_trait;

// Need async_trait for async functions in traits
#[async_trait]
pub trait MarketDataAcquirer: Send + Sync {
    /// Fetches daily closing prices for `ticker` from the provider's fixed
    /// historical start date through now.
    ///
    /// Returns an empty series when every retrieval strategy failed or came
    /// back with too few rows; `Err` is reserved for faults outside the
    /// strategy chain. Callers treat an empty series as a domain-level
    /// failure, not a crash.
    async fn fetch_daily_closes(&self, ticker: &str) -> Result<PriceSeries>;
}
