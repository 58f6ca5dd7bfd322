//! Per-ticker orchestration with rate-limit retry and request pacing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use comps_core::{
    CompsError, Filing, FilingForm, FilingLocator, FinancialRecord, FxQuoteProvider,
    LanguageModel, RawExtraction, Result, StatementSource, Symbol,
};

use crate::normalize::{
    CurrencyConverter, MagnitudePolicy, Normalizer, UnconvertedCurrencyPolicy,
};
use crate::render::{Rendered, render};
use crate::semantic::SemanticExtractor;
use crate::{period, structured};

/// Orchestrator settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Filing forms searched for the latest annual report.
    pub forms: Vec<FilingForm>,
    /// Pause before retrying a rate-limited ticker.
    pub rate_limit_cooldown: Duration,
    /// Pause between consecutive tickers.
    pub inter_request_delay: Duration,
    /// Attempts per ticker, including the first.
    pub max_attempts: u32,
    /// Handling of foreign currencies with no USD rate.
    pub unconverted_currency: UnconvertedCurrencyPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forms: FilingForm::ANNUAL.to_vec(),
            rate_limit_cooldown: Duration::from_secs(20),
            inter_request_delay: Duration::from_secs(10),
            max_attempts: 2,
            unconverted_currency: UnconvertedCurrencyPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Sets the forms searched.
    #[must_use]
    pub fn with_forms(mut self, forms: impl Into<Vec<FilingForm>>) -> Self {
        self.forms = forms.into();
        self
    }

    /// Sets the rate-limit cooldown.
    #[must_use]
    pub const fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    /// Sets the pause between tickers.
    #[must_use]
    pub const fn with_inter_request_delay(mut self, delay: Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    /// Sets the attempts per ticker.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the unconverted-currency policy.
    #[must_use]
    pub const fn with_unconverted_currency(mut self, policy: UnconvertedCurrencyPolicy) -> Self {
        self.unconverted_currency = policy;
        self
    }
}

/// Final state of one ticker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TickerStatus {
    /// A record was produced.
    Extracted(FinancialRecord),
    /// The issuer has no qualifying annual filing.
    NotFound,
    /// Processing failed; the message describes the last error.
    Failed(String),
}

/// Outcome of one ticker in a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickerReport {
    /// Ticker as requested.
    pub ticker: Symbol,
    /// Attempts made.
    pub attempts: u32,
    /// Final state.
    pub status: TickerStatus,
}

/// Per-ticker outcomes of a batch, in request order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per requested ticker.
    pub tickers: Vec<TickerReport>,
}

impl BatchReport {
    /// Records of the tickers that succeeded, in request order.
    #[must_use]
    pub fn records(&self) -> Vec<&FinancialRecord> {
        self.tickers
            .iter()
            .filter_map(|t| match &t.status {
                TickerStatus::Extracted(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Consumes the report, keeping the successful records.
    #[must_use]
    pub fn into_records(self) -> Vec<FinancialRecord> {
        self.tickers
            .into_iter()
            .filter_map(|t| match t.status {
                TickerStatus::Extracted(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Tickers that produced no record.
    #[must_use]
    pub fn skipped(&self) -> Vec<&TickerReport> {
        self.tickers
            .iter()
            .filter(|t| !matches!(t.status, TickerStatus::Extracted(_)))
            .collect()
    }
}

/// Extracts normalized income-statement figures for a list of tickers.
///
/// Tickers are processed sequentially. A rate-limited ticker is retried after
/// a cooldown, any other failure skips it, and the batch always completes.
///
/// # Example
///
/// ```rust,ignore
/// use comps::{CompsPipeline, PipelineConfig};
///
/// let pipeline = CompsPipeline::builder()
///     .with_edgar("MyApp/1.0 (contact@example.com)")
///     .with_yahoo()
///     .config(PipelineConfig::default())
///     .build()?;
///
/// let records = pipeline.run(&["AAPL", "MSFT"]).await;
/// ```
pub struct CompsPipeline {
    locator: Arc<dyn FilingLocator>,
    statements: Arc<dyn StatementSource>,
    semantic: Option<SemanticExtractor>,
    normalizer: Normalizer,
    config: PipelineConfig,
}

impl std::fmt::Debug for CompsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompsPipeline")
            .field("locator", &self.locator.name())
            .field("statements", &self.statements.name())
            .field("semantic", &self.semantic.as_ref().map(|_| "configured"))
            .field("normalizer", &self.normalizer)
            .field("config", &self.config)
            .finish()
    }
}

impl CompsPipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder() -> CompsPipelineBuilder {
        CompsPipelineBuilder::default()
    }

    /// Builds a pipeline on SEC EDGAR, Yahoo Finance and Gemini.
    ///
    /// The Gemini key is read from the environment.
    #[cfg(all(feature = "edgar", feature = "yahoo", feature = "gemini"))]
    pub fn from_env(edgar_identity: &str) -> Result<Self> {
        Self::builder()
            .with_edgar(edgar_identity)
            .with_yahoo()
            .with_gemini(comps_gemini::GeminiConfig::from_env()?)
            .build()
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes `tickers` in order and returns the records that succeeded.
    ///
    /// The result holds fewer records than tickers when some were skipped.
    pub async fn run<S: AsRef<str>>(&self, tickers: &[S]) -> Vec<FinancialRecord> {
        self.run_with_report(tickers).await.into_records()
    }

    /// Processes `tickers` in order, reporting the outcome of each.
    #[instrument(skip_all, fields(tickers = tickers.len()))]
    pub async fn run_with_report<S: AsRef<str>>(&self, tickers: &[S]) -> BatchReport {
        let mut report = BatchReport::default();

        for (i, ticker) in tickers.iter().enumerate() {
            let symbol = Symbol::new(ticker.as_ref());
            report.tickers.push(self.process_with_retry(&symbol).await);

            if i + 1 < tickers.len() && !self.config.inter_request_delay.is_zero() {
                debug!(delay = ?self.config.inter_request_delay, "Pacing before next ticker");
                sleep(self.config.inter_request_delay).await;
            }
        }

        let extracted = report.records().len();
        info!(
            requested = tickers.len(),
            extracted,
            skipped = tickers.len() - extracted,
            "Batch complete"
        );
        report
    }

    async fn process_with_retry(&self, symbol: &Symbol) -> TickerReport {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        let status = loop {
            attempts += 1;
            info!(ticker = %symbol, attempt = attempts, "Processing");

            match self.process_ticker(symbol).await {
                Ok(record) => {
                    info!(
                        ticker = %symbol,
                        fiscal_year = record.fiscal_year,
                        extraction = %record.extraction,
                        "Extracted"
                    );
                    break TickerStatus::Extracted(record);
                }
                Err(CompsError::FilingNotFound(_)) => {
                    warn!(ticker = %symbol, "No annual filing found, skipping");
                    break TickerStatus::NotFound;
                }
                Err(e) if e.is_rate_limited() && attempts < max_attempts => {
                    warn!(
                        ticker = %symbol,
                        error = %e,
                        cooldown = ?self.config.rate_limit_cooldown,
                        "Rate limited, waiting before retry"
                    );
                    sleep(self.config.rate_limit_cooldown).await;
                }
                Err(e) => {
                    warn!(ticker = %symbol, error = %e, "Skipping ticker");
                    break TickerStatus::Failed(e.to_string());
                }
            }
        };

        TickerReport {
            ticker: symbol.clone(),
            attempts,
            status,
        }
    }

    /// Runs one attempt for `symbol`: locate, render, extract, normalize.
    #[instrument(skip_all, fields(ticker = %symbol))]
    pub async fn process_ticker(&self, symbol: &Symbol) -> Result<FinancialRecord> {
        let filing = self
            .locator
            .find_latest_annual_filing(symbol, &self.config.forms)
            .await?
            .ok_or_else(|| CompsError::FilingNotFound(symbol.to_string()))?;
        debug!(
            form = %filing.form,
            filing_date = %filing.filing_date,
            accession = %filing.accession_number,
            "Located filing"
        );

        let rendered = render(self.statements.as_ref(), &filing).await?;
        let raw = self.extract(&filing, &rendered).await?;
        let figures = self.normalizer.normalize(&raw).await?;
        let fiscal_year = raw.fiscal_year.unwrap_or_else(|| filing.filing_year() - 1);

        Ok(FinancialRecord::new(
            symbol.clone(),
            filing.form,
            filing.filing_date,
            fiscal_year,
            figures.revenue,
            figures.net_income,
            figures.ebitda,
        )
        .with_currency(figures.reporting_currency, figures.fx.rate, figures.fx.source)
        .with_extraction(raw.method))
    }

    /// Structured extraction from the table, else the language model on the text.
    async fn extract(&self, filing: &Filing, rendered: &Rendered) -> Result<RawExtraction> {
        if let Some(table) = &rendered.table {
            match period::resolve(table) {
                Some(column) => {
                    debug!(
                        column = column.index,
                        header = %column.header,
                        fiscal_year = column.fiscal_year,
                        "Resolved latest period"
                    );
                    if let Some(raw) = structured::extract(table, &column) {
                        return Ok(raw);
                    }
                    debug!("Statement rows unrecognized, falling back to model");
                }
                None => debug!("No fiscal year in column headers, falling back to model"),
            }
        }

        let semantic = self.semantic.as_ref().ok_or_else(|| {
            CompsError::UnusableStatement(format!(
                "{} (no language model configured)",
                filing.symbol
            ))
        })?;
        semantic
            .extract_via_model(&rendered.text, &filing.symbol, filing.filing_year())
            .await
    }
}

/// Builder for [`CompsPipeline`].
///
/// A filing locator and a statement source are required. Without a language
/// model, tickers whose statements cannot be read structurally are skipped;
/// without an FX quote provider, only the fixed fallback rates are known.
#[derive(Default)]
pub struct CompsPipelineBuilder {
    locator: Option<Arc<dyn FilingLocator>>,
    statements: Option<Arc<dyn StatementSource>>,
    model: Option<Arc<dyn LanguageModel>>,
    quotes: Option<Arc<dyn FxQuoteProvider>>,
    magnitude: Option<Arc<dyn MagnitudePolicy>>,
    config: PipelineConfig,
}

impl std::fmt::Debug for CompsPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompsPipelineBuilder")
            .field("locator", &self.locator.as_ref().map(|p| p.name()))
            .field("statements", &self.statements.as_ref().map(|p| p.name()))
            .field("model", &self.model.as_ref().map(|p| p.name()))
            .field("quotes", &self.quotes.as_ref().map(|p| p.name()))
            .field("magnitude", &self.magnitude)
            .field("config", &self.config)
            .finish()
    }
}

impl CompsPipelineBuilder {
    /// Sets the filing locator.
    #[must_use]
    pub fn locator(mut self, locator: Arc<dyn FilingLocator>) -> Self {
        debug!(provider = locator.name(), "Registering filing locator");
        self.locator = Some(locator);
        self
    }

    /// Sets the statement source.
    #[must_use]
    pub fn statements(mut self, statements: Arc<dyn StatementSource>) -> Self {
        debug!(provider = statements.name(), "Registering statement source");
        self.statements = Some(statements);
        self
    }

    /// Sets the language model used when structured extraction fails.
    #[must_use]
    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        debug!(provider = model.name(), "Registering language model");
        self.model = Some(model);
        self
    }

    /// Sets the FX quote provider.
    #[must_use]
    pub fn fx_quotes(mut self, quotes: Arc<dyn FxQuoteProvider>) -> Self {
        debug!(provider = quotes.name(), "Registering FX quote provider");
        self.quotes = Some(quotes);
        self
    }

    /// Replaces the default magnitude policy.
    #[must_use]
    pub fn magnitude(mut self, magnitude: Arc<dyn MagnitudePolicy>) -> Self {
        self.magnitude = Some(magnitude);
        self
    }

    /// Sets the orchestrator configuration.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses SEC EDGAR as filing locator and statement source.
    #[cfg(feature = "edgar")]
    #[must_use]
    pub fn with_edgar(self, user_agent: &str) -> Self {
        let provider = Arc::new(comps_edgar::EdgarProvider::new(user_agent));
        self.locator(provider.clone()).statements(provider)
    }

    /// Uses Yahoo Finance for FX quotes.
    #[cfg(feature = "yahoo")]
    #[must_use]
    pub fn with_yahoo(self) -> Self {
        self.fx_quotes(Arc::new(comps_yahoo::YahooProvider::new()))
    }

    /// Uses Google Gemini as language model.
    #[cfg(feature = "gemini")]
    #[must_use]
    pub fn with_gemini(self, config: comps_gemini::GeminiConfig) -> Self {
        self.model(Arc::new(comps_gemini::GeminiProvider::new(config)))
    }

    /// Builds the pipeline.
    pub fn build(self) -> Result<CompsPipeline> {
        let locator = self.locator.ok_or_else(|| {
            CompsError::ProviderNotConfigured("No filing locator registered".to_string())
        })?;
        let statements = self.statements.ok_or_else(|| {
            CompsError::ProviderNotConfigured("No statement source registered".to_string())
        })?;
        if self.config.forms.is_empty() {
            return Err(CompsError::InvalidParameter(
                "At least one filing form is required".to_string(),
            ));
        }

        let converter = self
            .quotes
            .map_or_else(CurrencyConverter::offline, CurrencyConverter::new)
            .with_policy(self.config.unconverted_currency);
        let mut normalizer = Normalizer::new(converter);
        if let Some(magnitude) = self.magnitude {
            normalizer = normalizer.with_magnitude(magnitude);
        }

        Ok(CompsPipeline {
            locator,
            statements,
            semantic: self.model.map(SemanticExtractor::new),
            normalizer,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.forms, vec![FilingForm::TenK, FilingForm::TwentyF]);
        assert_eq!(config.rate_limit_cooldown, Duration::from_secs(20));
        assert_eq!(config.inter_request_delay, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.unconverted_currency, UnconvertedCurrencyPolicy::Reject);
    }

    #[test]
    fn test_build_requires_locator_and_source() {
        let result = CompsPipeline::builder().build();
        assert!(matches!(result, Err(CompsError::ProviderNotConfigured(_))));
    }

    #[test]
    fn test_report_partitions_outcomes() {
        let record = FinancialRecord::new(
            Symbol::new("A"),
            FilingForm::TenK,
            chrono::NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            2024,
            10.0,
            1.0,
            2.0,
        );
        let report = BatchReport {
            tickers: vec![
                TickerReport {
                    ticker: Symbol::new("A"),
                    attempts: 1,
                    status: TickerStatus::Extracted(record.clone()),
                },
                TickerReport {
                    ticker: Symbol::new("B"),
                    attempts: 1,
                    status: TickerStatus::NotFound,
                },
            ],
        };
        assert_eq!(report.records(), vec![&record]);
        assert_eq!(report.skipped()[0].ticker.as_str(), "B");
        assert_eq!(report.into_records(), vec![record]);
    }
}
