//! Core data types for filing extraction.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`Filing`] - A located annual filing
//! - [`RawExtraction`] - Line items as read from a statement, before normalization
//! - [`FinancialRecord`] - Normalized figures in USD millions

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::form::FilingForm;

/// Currency assumed when a statement does not state one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A located annual filing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
    /// Symbol the filing was located for.
    pub symbol: Symbol,
    /// SEC CIK number, zero-padded to 10 digits.
    pub cik: String,
    /// Form type.
    pub form: FilingForm,
    /// Accession number (unique filing identifier).
    pub accession_number: String,
    /// Date the filing was submitted.
    pub filing_date: NaiveDate,
    /// Period-of-report date, when the filer states one.
    pub report_date: Option<NaiveDate>,
    /// Primary document filename.
    pub primary_document: Option<String>,
}

impl Filing {
    /// Creates a filing with required fields.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        cik: impl Into<String>,
        form: FilingForm,
        accession_number: impl Into<String>,
        filing_date: NaiveDate,
    ) -> Self {
        Self {
            symbol,
            cik: cik.into(),
            form,
            accession_number: accession_number.into(),
            filing_date,
            report_date: None,
            primary_document: None,
        }
    }

    /// Sets the period-of-report date.
    #[must_use]
    pub const fn with_report_date(mut self, report_date: NaiveDate) -> Self {
        self.report_date = Some(report_date);
        self
    }

    /// Sets the primary document filename.
    #[must_use]
    pub fn with_primary_document(mut self, document: impl Into<String>) -> Self {
        self.primary_document = Some(document.into());
        self
    }

    /// Calendar year the filing was submitted in.
    #[must_use]
    pub fn filing_year(&self) -> i32 {
        self.filing_date.year()
    }
}

/// Which extraction path produced a set of line items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Direct table access and label matching.
    #[default]
    Structured,
    /// Period discovery followed by single-column extraction.
    TwoStage,
    /// One-pass model extraction.
    SingleCall,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => f.write_str("structured"),
            Self::TwoStage => f.write_str("two-stage"),
            Self::SingleCall => f.write_str("single-call"),
        }
    }
}

/// Line items read from one statement column, before normalization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    /// Total revenue.
    pub revenue: Option<f64>,
    /// Net income.
    pub net_income: Option<f64>,
    /// Operating income.
    pub operating_income: Option<f64>,
    /// Depreciation and amortization.
    pub dep_amort: Option<f64>,
    /// Reporting currency as stated by the source.
    pub reporting_currency: Option<String>,
    /// Fiscal year of the column the values were read from.
    pub fiscal_year: Option<i32>,
    /// Extraction path that produced these values.
    pub method: ExtractionMethod,
}

impl RawExtraction {
    /// Creates an empty extraction for the given method.
    #[must_use]
    pub fn new(method: ExtractionMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Returns true when revenue, net income and operating income are all zero or absent.
    #[must_use]
    pub fn is_unusable(&self) -> bool {
        [self.revenue, self.net_income, self.operating_income]
            .iter()
            .all(|v| v.unwrap_or(0.0) == 0.0)
    }

    /// Three-letter reporting currency, defaulting to USD.
    #[must_use]
    pub fn currency_code(&self) -> String {
        self.reporting_currency
            .as_deref()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .map(|c| c.chars().take(3).collect())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    }
}

/// How the USD conversion factor of a record was obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FxSource {
    /// Figures were already in USD.
    #[default]
    Identity,
    /// Most recent close of the currency pair.
    Quote,
    /// Fixed approximate rate used because no quote was available.
    Fallback,
    /// No rate was available; figures remain in the reporting currency.
    Unconverted,
}

impl fmt::Display for FxSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("identity"),
            Self::Quote => f.write_str("quote"),
            Self::Fallback => f.write_str("fallback"),
            Self::Unconverted => f.write_str("unconverted"),
        }
    }
}

/// Normalized income-statement figures for one ticker, in USD millions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    /// Ticker as supplied by the caller, uppercased.
    pub ticker: Symbol,
    /// Form type of the source filing.
    pub form: FilingForm,
    /// Date of the source filing.
    pub filing_date: NaiveDate,
    /// Fiscal year the figures represent.
    pub fiscal_year: i32,
    /// Revenue.
    pub revenue: f64,
    /// Net income.
    pub net_income: f64,
    /// Operating income plus depreciation and amortization.
    pub ebitda: f64,
    /// Net income as a percentage of revenue.
    pub net_margin_percent: f64,
    /// Currency the filing reported in.
    pub reporting_currency: String,
    /// USD per unit of reporting currency.
    pub fx_rate: f64,
    /// Origin of `fx_rate`.
    pub fx_source: FxSource,
    /// Extraction path that produced the figures.
    pub extraction: ExtractionMethod,
}

impl FinancialRecord {
    /// Creates a USD record; net margin is derived from revenue and net income.
    #[must_use]
    pub fn new(
        ticker: Symbol,
        form: FilingForm,
        filing_date: NaiveDate,
        fiscal_year: i32,
        revenue: f64,
        net_income: f64,
        ebitda: f64,
    ) -> Self {
        Self {
            ticker,
            form,
            filing_date,
            fiscal_year,
            revenue,
            net_income,
            ebitda,
            net_margin_percent: net_margin_percent(revenue, net_income),
            reporting_currency: DEFAULT_CURRENCY.to_string(),
            fx_rate: 1.0,
            fx_source: FxSource::Identity,
            extraction: ExtractionMethod::Structured,
        }
    }

    /// Sets the reporting currency and the conversion applied to it.
    #[must_use]
    pub fn with_currency(
        mut self,
        currency: impl Into<String>,
        fx_rate: f64,
        fx_source: FxSource,
    ) -> Self {
        self.reporting_currency = currency.into();
        self.fx_rate = fx_rate;
        self.fx_source = fx_source;
        self
    }

    /// Sets the extraction path.
    #[must_use]
    pub const fn with_extraction(mut self, extraction: ExtractionMethod) -> Self {
        self.extraction = extraction;
        self
    }
}

/// Net income as a percentage of revenue; zero when revenue is not positive.
#[must_use]
pub fn net_margin_percent(revenue: f64, net_income: f64) -> f64 {
    if revenue > 0.0 {
        net_income / revenue * 100.0
    } else {
        0.0
    }
}
