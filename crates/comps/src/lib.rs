#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/comps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Normalized income-statement figures from annual filings.
//!
//! This crate re-exports the core types and provider implementations and
//! provides [`CompsPipeline`], which turns a list of tickers into
//! [`FinancialRecord`]s:
//!
//! 1. locate the latest 10-K or 20-F ([`FilingLocator`])
//! 2. build its income statement ([`render()`])
//! 3. pick the latest fiscal-year column ([`period::resolve`])
//! 4. read the line items by label ([`structured::extract`]), or through a
//!    language model when that fails ([`SemanticExtractor`])
//! 5. convert to USD millions ([`Normalizer`])
//!
//! # Features
//!
//! - `edgar` - SEC EDGAR filing locator and statement source
//! - `yahoo` - Yahoo Finance currency quotes
//! - `gemini` - Google Gemini language model

// Core types and traits
pub use comps_core::*;

// Providers
#[cfg(feature = "edgar")]
pub use comps_edgar::EdgarProvider;
#[cfg(feature = "gemini")]
pub use comps_gemini::{GeminiConfig, GeminiProvider};
#[cfg(feature = "yahoo")]
pub use comps_yahoo::YahooProvider;

mod frame;
pub mod normalize;
pub mod period;
mod pipeline;
mod render;
pub mod semantic;
pub mod structured;

pub use frame::records_to_frame;
pub use normalize::{
    CurrencyConverter, FxRate, MagnitudePolicy, NormalizedFigures, Normalizer,
    ThresholdMagnitude, UnconvertedCurrencyPolicy,
};
pub use period::PeriodColumn;
pub use pipeline::{
    BatchReport, CompsPipeline, CompsPipelineBuilder, PipelineConfig, TickerReport, TickerStatus,
};
pub use render::{Rendered, render};
pub use semantic::{DiscoveredColumn, SemanticExtractor};
