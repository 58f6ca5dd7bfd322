#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/comps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance currency quotes.
//!
//! This crate provides a Yahoo Finance provider implementing the
//! [`FxQuoteProvider`] trait from `comps-core`.
//!
//! # Features
//!
//! - Latest close of a currency-pair instrument via the chart API
//! - Built-in rate limiting (1 request per second by default)
//! - Missing instruments reported as `None` rather than errors

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use comps_core::{CompsError, DataProvider, FxQuoteProvider, Result};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

const PROVIDER_NAME: &str = "Yahoo Finance";

/// Yahoo Finance quote provider.
///
/// Implements [`DataProvider`] and [`FxQuoteProvider`].
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new Yahoo Finance provider with a custom HTTP client.
    ///
    /// Rate limiting is still applied.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Create a new Yahoo Finance provider with custom rate limiting.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build Yahoo HTTP client, using defaults");
                reqwest::Client::new()
            });

        Self {
            client,
            rate_limit_ms: u64::try_from(rate_limit.as_millis()).unwrap_or(u64::MAX),
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now_millis().saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time
            .store(now_millis(), Ordering::Relaxed);
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Yahoo Finance daily closes for currency-pair instruments"
    }
}

#[async_trait]
impl FxQuoteProvider for YahooProvider {
    async fn recent_close(&self, pair: &str) -> Result<Option<f64>> {
        let pair = pair.trim();
        if pair.is_empty() {
            return Err(CompsError::InvalidParameter(
                "Empty currency pair".to_string(),
            ));
        }

        self.apply_rate_limit().await;

        let url = build_chart_url(pair);
        debug!("Fetching FX quote: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CompsError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CompsError::rate_limited(
                PROVIDER_NAME,
                Some(Duration::from_secs(60)),
            ));
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(pair = %pair, "Instrument not found");
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(CompsError::Network(format!(
                "HTTP {} for {}",
                response.status(),
                pair
            )));
        }

        let chart_response: ChartResponse = response
            .json()
            .await
            .map_err(|e| CompsError::Parse(e.to_string()))?;

        last_close(chart_response)
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Chart URL for the last five daily bars of `pair`.
fn build_chart_url(pair: &str) -> String {
    format!("{}/{}?range=5d&interval=1d", CHART_API_URL, pair)
}

/// Most recent non-null, positive close in a chart response.
fn last_close(response: ChartResponse) -> Result<Option<f64>> {
    if let Some(error) = response.chart.error {
        if error.code == "Not Found" {
            return Ok(None);
        }
        return Err(CompsError::Other(format!(
            "{}: {}",
            error.code, error.description
        )));
    }

    let close = response
        .chart
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|data| data.indicators.quote.into_iter().next())
        .and_then(|quote| {
            quote
                .close
                .into_iter()
                .rev()
                .flatten()
                .find(|c| c.is_finite() && *c > 0.0)
        });

    Ok(close)
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    close: Vec<Option<f64>>,
}
