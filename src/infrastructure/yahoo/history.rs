//! Daily close history from the Yahoo Finance chart API.
//!
//! Retrieval runs through an ordered list of [`FetchStrategy`] values, each a
//! different query shape and transport posture against the same provider.
//! The first strategy that yields a usable series wins; the rest are never
//! attempted. Strategy failures are logged and swallowed, and only when the
//! whole chain is exhausted does the acquirer hand back an empty series.

use crate::config::TransportConfig;
use crate::domain::ports::MarketDataAcquirer;
use crate::domain::types::{PricePoint, PriceSeries};
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// A fetched series is usable only with strictly more than this many rows.
const MIN_USABLE_ROWS: usize = 10;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; stockcast/0.1)";

/// One way of asking the provider for a ticker's daily close history.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, ticker: &str, start: NaiveDate) -> Result<PriceSeries>;
}

/// Ordered-fallback acquirer over the Yahoo chart API.
pub struct YahooHistoryAcquirer {
    strategies: Vec<Box<dyn FetchStrategy>>,
    history_start: NaiveDate,
}

impl YahooHistoryAcquirer {
    /// Builds the production strategy chain:
    /// 1. bulk chart-range query on the primary host, retry middleware and
    ///    the configured transport posture;
    /// 2. per-instrument full-history query on the fallback host, same
    ///    transport posture;
    /// 3. the bulk query again on a default-configured client (no retries,
    ///    default TLS verification).
    pub fn new(
        base_url: String,
        fallback_url: String,
        history_start: NaiveDate,
        transport: &TransportConfig,
    ) -> Self {
        let strategies: Vec<Box<dyn FetchStrategy>> = vec![
            Box::new(ChartRangeStrategy {
                name: "bulk chart range",
                client: HttpClientFactory::create_client(transport),
                base_url: base_url.clone(),
            }),
            Box::new(InstrumentHistoryStrategy {
                client: HttpClientFactory::create_client(transport),
                base_url: fallback_url,
            }),
            Box::new(ChartRangeStrategy {
                name: "chart range (default transport)",
                client: HttpClientFactory::create_default_client(),
                base_url,
            }),
        ];
        Self {
            strategies,
            history_start,
        }
    }

    /// Replaces the strategy chain. Exists so the fallback ordering can be
    /// exercised against scripted strategies.
    pub fn with_strategies(
        strategies: Vec<Box<dyn FetchStrategy>>,
        history_start: NaiveDate,
    ) -> Self {
        Self {
            strategies,
            history_start,
        }
    }
}

#[async_trait]
impl MarketDataAcquirer for YahooHistoryAcquirer {
    async fn fetch_daily_closes(&self, ticker: &str) -> Result<PriceSeries> {
        info!("Downloading stock data for {}...", ticker);

        for (attempt, strategy) in self.strategies.iter().enumerate() {
            debug!(
                "Attempt {}: {} for {}",
                attempt + 1,
                strategy.name(),
                ticker
            );
            match strategy.fetch(ticker, self.history_start).await {
                Ok(series) if series.len() > MIN_USABLE_ROWS => {
                    info!(
                        "Downloaded {} rows for {} via {}",
                        series.len(),
                        ticker,
                        strategy.name()
                    );
                    return Ok(series);
                }
                Ok(series) => {
                    warn!(
                        "{} returned only {} rows for {}, trying next strategy",
                        strategy.name(),
                        series.len(),
                        ticker
                    );
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", strategy.name(), ticker, e);
                }
            }
        }

        warn!("All download attempts failed for {}", ticker);
        Ok(Vec::new())
    }
}

// ===== Strategies =====

/// Bulk historical-range query: explicit epoch bounds on the chart endpoint.
struct ChartRangeStrategy {
    name: &'static str,
    client: ClientWithMiddleware,
    base_url: String,
}

#[async_trait]
impl FetchStrategy for ChartRangeStrategy {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, ticker: &str, start: NaiveDate) -> Result<PriceSeries> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0)
            .to_string();
        let period2 = Utc::now().timestamp().to_string();

        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let url = build_url_with_query(
            &url,
            &[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
                ("events", "history"),
                ("includeAdjustedClose", "true"),
            ],
        );

        fetch_chart(&self.client, &url, start).await
    }
}

/// Per-instrument history query: range-based request on the alternate host,
/// trimmed to the historical start date on our side.
struct InstrumentHistoryStrategy {
    client: ClientWithMiddleware,
    base_url: String,
}

#[async_trait]
impl FetchStrategy for InstrumentHistoryStrategy {
    fn name(&self) -> &str {
        "instrument history"
    }

    async fn fetch(&self, ticker: &str, start: NaiveDate) -> Result<PriceSeries> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let url = build_url_with_query(
            &url,
            &[
                ("range", "max"),
                ("interval", "1d"),
                ("includeAdjustedClose", "true"),
            ],
        );

        fetch_chart(&self.client, &url, start).await
    }
}

async fn fetch_chart(
    client: &ClientWithMiddleware,
    url: &str,
    start: NaiveDate,
) -> Result<PriceSeries> {
    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .context("Failed to reach chart endpoint")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Chart endpoint error ({}): {}", status, body);
    }

    let body: ChartResponse = response
        .json()
        .await
        .context("Failed to parse chart response")?;

    chart_to_series(body, start)
}

// ===== Response parsing =====

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteBlock>,
    adjclose: Option<Vec<AdjCloseBlock>>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    adjclose: Option<Vec<Option<f64>>>,
}

/// Flattens a chart payload into a chronological series of daily closes.
///
/// Adjusted closes are preferred when present (the provider's raw closes are
/// not split/dividend adjusted). Null slots and rows before `start` are
/// dropped; a duplicate date keeps the later bar.
fn chart_to_series(body: ChartResponse, start: NaiveDate) -> Result<PriceSeries> {
    if let Some(err) = body.chart.error {
        if !err.is_null() {
            anyhow::bail!("Provider returned error payload: {}", err);
        }
    }

    let result = body
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .context("Chart response contained no result")?;

    let timestamps = result.timestamp.unwrap_or_default();
    let closes = result
        .indicators
        .adjclose
        .and_then(|mut blocks| {
            if blocks.is_empty() {
                None
            } else {
                blocks.remove(0).adjclose
            }
        })
        .or_else(|| {
            result
                .indicators
                .quote
                .into_iter()
                .next()
                .and_then(|q| q.close)
        })
        .unwrap_or_default();

    let mut series: PriceSeries = Vec::with_capacity(timestamps.len());
    for (ts, close) in timestamps.into_iter().zip(closes.into_iter()) {
        let Some(close) = close else { continue };
        let Some(date) = DateTime::<Utc>::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        if date < start {
            continue;
        }
        match series.last_mut() {
            Some(last) if last.date == date => last.close = close,
            _ => series.push(PricePoint { date, close }),
        }
    }

    Ok(series)
}
