#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/comps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR filing locator and income-statement source.
//!
//! # Example
//!
//! ```no_run
//! use comps_edgar::EdgarProvider;
//! use comps_core::{FilingForm, FilingLocator, StatementSource, StatementView, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = EdgarProvider::new("MyApp/1.0 (contact@example.com)");
//!
//!     let symbol = Symbol::new("AAPL");
//!     if let Some(filing) = provider
//!         .find_latest_annual_filing(&symbol, &FilingForm::ANNUAL)
//!         .await?
//!     {
//!         println!("{} filed {}", filing.form, filing.filing_date);
//!         if let Some(table) = provider
//!             .statement(&filing, StatementView::IncomeStatement)
//!             .await?
//!         {
//!             println!("{}", table.render_text());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod statement;

use async_trait::async_trait;
use chrono::NaiveDate;
use comps_core::{
    CompsError, DataProvider, Filing, FilingForm, FilingLocator, Result, StatementSource,
    StatementTable, StatementView, Symbol,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// SEC EDGAR API base URL
const EDGAR_BASE_URL: &str = "https://data.sec.gov";

/// SEC company tickers URL
const COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// Default rate limit: 10 requests per second (SEC requirement)
const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

const PROVIDER_NAME: &str = "SEC EDGAR";

/// Rate limiter to ensure we don't exceed SEC's rate limits
#[derive(Debug)]
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// SEC EDGAR filing locator and statement source.
///
/// Implements rate limiting per SEC requirements (max 10 requests/second).
/// The ticker map is downloaded once per provider, and the company facts of
/// the most recently used CIK are kept so that trying several statement views
/// of one filing costs a single download.
#[derive(Debug)]
pub struct EdgarProvider {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    tickers: OnceCell<HashMap<String, String>>,
    facts: Mutex<Option<(String, Arc<CompanyFactsResponse>)>>,
}

impl EdgarProvider {
    /// Create a new EDGAR provider with the specified user agent.
    ///
    /// The SEC requires identifying user agent headers. Format should be:
    /// "AppName/Version (contact@email.com)"
    ///
    /// # Example
    /// ```
    /// use comps_edgar::EdgarProvider;
    ///
    /// let provider = EdgarProvider::new("MyApp/1.0 (contact@example.com)");
    /// ```
    pub fn new(user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build EDGAR HTTP client, using defaults");
                reqwest::Client::new()
            });

        Self::with_client(client)
    }

    /// Create a new EDGAR provider with a custom HTTP client.
    ///
    /// The client must already carry an identifying user agent.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(DEFAULT_RATE_LIMIT))),
            tickers: OnceCell::new(),
            facts: Mutex::new(None),
        }
    }

    /// Look up a company's CIK number from its ticker symbol.
    ///
    /// Returns the CIK zero-padded to 10 digits, or `None` if the SEC does not
    /// list the ticker.
    pub async fn lookup_cik(&self, ticker: &str) -> Result<Option<String>> {
        if ticker.trim().is_empty() {
            return Err(CompsError::InvalidParameter("Empty ticker".to_string()));
        }

        let tickers = self
            .tickers
            .get_or_try_init(|| async {
                debug!("Fetching company tickers from SEC");
                let data: HashMap<String, CompanyTickerInfo> =
                    self.get_json(COMPANY_TICKERS_URL).await?.ok_or_else(|| {
                        CompsError::Network("Company tickers file not found".to_string())
                    })?;
                Ok::<_, CompsError>(ticker_map(data))
            })
            .await?;

        let cik = tickers.get(&ticker.trim().to_uppercase()).cloned();
        debug!("CIK for {}: {:?}", ticker, cik);
        Ok(cik)
    }

    /// Fetch company submissions/filings metadata.
    async fn fetch_company_submissions(&self, cik: &str) -> Result<Option<CompanySubmissions>> {
        let url = format!("{}/submissions/CIK{}.json", EDGAR_BASE_URL, pad_cik(cik));
        self.get_json(&url).await
    }

    /// Fetch company facts from SEC EDGAR, reusing the last download for the same CIK.
    async fn fetch_company_facts(&self, cik: &str) -> Result<Option<Arc<CompanyFactsResponse>>> {
        let cik_padded = pad_cik(cik);

        let mut cached = self.facts.lock().await;
        if let Some((cached_cik, facts)) = cached.as_ref() {
            if *cached_cik == cik_padded {
                debug!("Company facts cache hit for CIK {}", cik_padded);
                return Ok(Some(Arc::clone(facts)));
            }
        }

        let url = format!(
            "{}/api/xbrl/companyfacts/CIK{}.json",
            EDGAR_BASE_URL, cik_padded
        );
        let facts: Option<CompanyFactsResponse> = self.get_json(&url).await?;

        Ok(facts.map(|facts| {
            let facts = Arc::new(facts);
            *cached = Some((cik_padded, Arc::clone(&facts)));
            facts
        }))
    }

    /// Rate-limited GET returning parsed JSON, or `None` on HTTP 404.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        self.rate_limiter.lock().await.wait().await;

        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CompsError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(CompsError::rate_limited(PROVIDER_NAME, retry_after));
        }

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(CompsError::AuthenticationFailed(format!(
                "{PROVIDER_NAME} (check the user agent identity)"
            )));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            return Err(CompsError::Network(format!("HTTP {} for {}", status, url)));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| CompsError::Parse(format!("Failed to parse {}: {}", url, e)))
    }
}

impl DataProvider for EdgarProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "SEC EDGAR annual filings (10-K, 20-F) with statements built from XBRL company facts"
    }
}

#[async_trait]
impl FilingLocator for EdgarProvider {
    async fn find_latest_annual_filing(
        &self,
        symbol: &Symbol,
        forms: &[FilingForm],
    ) -> Result<Option<Filing>> {
        let Some(cik) = self.lookup_cik(symbol.as_str()).await? else {
            debug!(ticker = %symbol, "Ticker not listed by SEC");
            return Ok(None);
        };

        let Some(submissions) = self.fetch_company_submissions(&cik).await? else {
            return Ok(None);
        };

        Ok(latest_filing(symbol, &cik, &submissions.filings.recent, forms))
    }
}

#[async_trait]
impl StatementSource for EdgarProvider {
    async fn statement(
        &self,
        filing: &Filing,
        view: StatementView,
    ) -> Result<Option<StatementTable>> {
        let Some(facts) = self.fetch_company_facts(&filing.cik).await? else {
            return Ok(None);
        };
        statement::build_statement(&facts, &filing.accession_number, view)
    }

    async fn financials_text(&self, filing: &Filing) -> Result<String> {
        let facts = self.fetch_company_facts(&filing.cik).await?.ok_or_else(|| {
            CompsError::Other(format!("No XBRL financial data for {}", filing.symbol))
        })?;
        Ok(statement::render_filing_facts(
            &facts,
            &filing.accession_number,
        ))
    }
}

/// Pad CIK to 10 digits as required by SEC.
fn pad_cik(cik: &str) -> String {
    format!("{:0>10}", cik)
}

/// Build the ticker to padded-CIK map.
fn ticker_map(data: HashMap<String, CompanyTickerInfo>) -> HashMap<String, String> {
    data.into_values()
        .map(|c| (c.ticker.to_uppercase(), pad_cik(&c.cik_str.to_string())))
        .collect()
}

/// Most recently filed entry among `forms`.
///
/// The SEC lists recent filings newest first, so the first entry wins a tie
/// on filing date.
fn latest_filing(
    symbol: &Symbol,
    cik: &str,
    recent: &RecentFilings,
    forms: &[FilingForm],
) -> Option<Filing> {
    let mut latest: Option<Filing> = None;

    for (i, form_code) in recent.form.iter().enumerate() {
        let Some(form) = forms.iter().find(|f| f.code() == form_code.as_str()) else {
            continue;
        };

        let (Some(accession), Some(date)) = (
            recent.accession_number.get(i),
            recent.filing_date.get(i).and_then(|d| parse_date(d)),
        ) else {
            warn!(ticker = %symbol, index = i, "Skipping malformed filing entry");
            continue;
        };

        if latest.as_ref().is_some_and(|l| l.filing_date >= date) {
            continue;
        }

        let mut filing = Filing::new(symbol.clone(), cik, *form, accession, date);
        if let Some(report_date) = recent.report_date.get(i).and_then(|d| parse_date(d)) {
            filing = filing.with_report_date(report_date);
        }
        if let Some(document) = recent.primary_document.get(i).filter(|d| !d.is_empty()) {
            filing = filing.with_primary_document(document);
        }
        latest = Some(filing);
    }

    latest
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

// =============================================================================
// SEC API Response Types
// =============================================================================

/// Company ticker information from SEC JSON.
#[derive(Debug, Deserialize)]
struct CompanyTickerInfo {
    /// CIK as a number (SEC returns this as an integer)
    cik_str: u64,
    /// Ticker symbol
    ticker: String,
}

/// Response from the SEC EDGAR Company Facts API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyFactsResponse {
    /// Entity name
    #[serde(default)]
    entity_name: String,
    /// Facts organized by taxonomy and tag
    #[serde(default)]
    facts: HashMap<String, HashMap<String, TagFacts>>,
}

/// Facts for a specific XBRL tag.
#[derive(Debug, Deserialize)]
struct TagFacts {
    /// Label/description
    #[serde(default)]
    label: Option<String>,
    /// Units (USD, JPY, shares, etc.) containing the actual fact values
    #[serde(default)]
    units: HashMap<String, Vec<FactValue>>,
}

/// A single fact value with metadata.
#[derive(Debug, Clone, Deserialize)]
struct FactValue {
    /// Start date of the period (duration facts only)
    #[serde(default)]
    start: Option<String>,
    /// End date of the period
    end: String,
    /// Value
    val: f64,
    /// Accession number
    #[serde(default)]
    accn: Option<String>,
}

/// Company submissions/filings metadata.
#[derive(Debug, Deserialize)]
struct CompanySubmissions {
    /// Filing history
    filings: FilingHistory,
}

/// Container for filing history data.
#[derive(Debug, Deserialize)]
struct FilingHistory {
    /// Recent filings
    recent: RecentFilings,
}

/// Recent filings as parallel arrays, one index per filing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
    #[serde(default)]
    report_date: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
    #[serde(default)]
    primary_document: Vec<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SUBMISSIONS: &str = r#"{
        "cik": "313838",
        "name": "SONY GROUP CORP",
        "filings": {
            "recent": {
                "accessionNumber": ["0001-25-000003", "0001-24-000002", "0001-24-000001", "0001-23-000009"],
                "filingDate": ["2025-02-13", "2024-06-25", "2024-05-14", "2023-06-27"],
                "reportDate": ["", "2024-03-31", "", "2023-03-31"],
                "form": ["6-K", "20-F", "6-K", "20-F"],
                "primaryDocument": ["d6k.htm", "d20f.htm", "d6k.htm", "d20f-2023.htm"]
            }
        }
    }"#;

    fn recent() -> RecentFilings {
        serde_json::from_str::<CompanySubmissions>(SUBMISSIONS)
            .unwrap()
            .filings
            .recent
    }

    #[test]
    fn test_latest_filing_picks_newest_annual_form() {
        let symbol = Symbol::new("SONY");
        let filing = latest_filing(&symbol, "0000313838", &recent(), &FilingForm::ANNUAL).unwrap();

        assert_eq!(filing.form, FilingForm::TwentyF);
        assert_eq!(filing.accession_number, "0001-24-000002");
        assert_eq!(
            filing.filing_date,
            NaiveDate::from_ymd_opt(2024, 6, 25).unwrap()
        );
        assert_eq!(
            filing.report_date,
            NaiveDate::from_ymd_opt(2024, 3, 31)
        );
        assert_eq!(filing.primary_document.as_deref(), Some("d20f.htm"));
    }

    #[test]
    fn test_latest_filing_respects_form_list() {
        let symbol = Symbol::new("SONY");
        assert!(latest_filing(&symbol, "0000313838", &recent(), &[FilingForm::TenK]).is_none());
    }

    #[test]
    fn test_latest_filing_orders_by_date_not_position() {
        let recent = RecentFilings {
            accession_number: vec!["old".into(), "new".into()],
            filing_date: vec!["2022-10-28".into(), "2023-11-03".into()],
            report_date: vec![],
            form: vec!["10-K".into(), "10-K".into()],
            primary_document: vec![],
        };
        let filing =
            latest_filing(&Symbol::new("AAPL"), "0000320193", &recent, &FilingForm::ANNUAL)
                .unwrap();
        assert_eq!(filing.accession_number, "new");
        assert!(filing.report_date.is_none());
    }

    #[test]
    fn test_ticker_map() {
        let data: HashMap<String, CompanyTickerInfo> = serde_json::from_str(
            r#"{"0": {"cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc."},
                "1": {"cik_str": 313838, "ticker": "sony", "title": "Sony Group Corp"}}"#,
        )
        .unwrap();
        let map = ticker_map(data);
        assert_eq!(map.get("AAPL").map(String::as_str), Some("0000320193"));
        assert_eq!(map.get("SONY").map(String::as_str), Some("0000313838"));
    }

    #[test]
    fn test_cik_padding() {
        assert_eq!(pad_cik("320193"), "0000320193");
        assert_eq!(pad_cik("1234567890"), "1234567890");
    }

    #[test]
    fn test_provider_traits() {
        let provider = EdgarProvider::new("Test/1.0 (test@example.com)");
        assert_eq!(provider.name(), "SEC EDGAR");
        assert!(!provider.description().is_empty());
    }

    #[tokio::test]
    async fn test_empty_ticker_rejected() {
        let provider = EdgarProvider::new("Test/1.0 (test@example.com)");
        let result = provider.lookup_cik("  ").await;
        assert!(matches!(result, Err(CompsError::InvalidParameter(_))));
    }
}
