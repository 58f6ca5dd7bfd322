//! Provider traits for the pipeline's collaborators.
//!
//! This module defines the seams the extraction pipeline depends on:
//!
//! - [`DataProvider`] - Base trait for all providers
//! - [`FilingLocator`] - Finds the latest annual filing for a symbol
//! - [`StatementSource`] - Builds income-statement tables and text from a filing
//! - [`LanguageModel`] - Single-turn text completion
//! - [`FxQuoteProvider`] - Recent closes for currency-pair instruments

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::Result,
    form::{FilingForm, StatementView},
    statement::StatementTable,
    types::{Filing, Symbol},
};

/// Base trait for all data providers.
///
/// All providers must implement this trait to provide basic metadata.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "SEC EDGAR").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// Locates annual filings.
#[async_trait]
pub trait FilingLocator: DataProvider {
    /// Finds the most recently filed annual report of any of `forms`.
    ///
    /// Returns `Ok(None)` when the issuer has no qualifying filing or the
    /// symbol is unknown.
    async fn find_latest_annual_filing(
        &self,
        symbol: &Symbol,
        forms: &[FilingForm],
    ) -> Result<Option<Filing>>;
}

/// Builds statements from a located filing.
#[async_trait]
pub trait StatementSource: DataProvider {
    /// Constructs the income statement using the given view.
    ///
    /// Returns `Ok(None)` when the view cannot be constructed for this filing.
    async fn statement(&self, filing: &Filing, view: StatementView)
    -> Result<Option<StatementTable>>;

    /// Renders the filing's financial data as text, without any statement view.
    async fn financials_text(&self, filing: &Filing) -> Result<String>;
}

/// Single-turn text completion.
///
/// Implementations hold no conversation state between calls.
#[async_trait]
pub trait LanguageModel: DataProvider {
    /// Generates a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Foreign-exchange quotes.
#[async_trait]
pub trait FxQuoteProvider: DataProvider {
    /// Most recent close of a currency-pair instrument (e.g., "EURUSD=X").
    ///
    /// Returns `Ok(None)` when the instrument has no recent closes.
    async fn recent_close(&self, pair: &str) -> Result<Option<f64>>;
}
