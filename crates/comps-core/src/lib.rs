#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/comps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for annual income-statement extraction.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`FilingLocator`](provider::FilingLocator) - Latest annual filing lookup
//! - [`StatementSource`](provider::StatementSource) - Statement tables and text
//! - [`LanguageModel`](provider::LanguageModel) - Text completion
//! - [`FxQuoteProvider`](provider::FxQuoteProvider) - Currency-pair closes
//! - [`StatementTable`](statement::StatementTable) - Income-statement grid

/// Error types for extraction operations.
pub mod error;
/// Filing form and statement view definitions.
pub mod form;
/// Provider traits for the pipeline's collaborators.
pub mod provider;
/// Income-statement grid.
pub mod statement;
/// Core data types (Symbol, Filing, FinancialRecord, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CompsError, Result};
pub use form::{FilingForm, StatementView};
pub use provider::{DataProvider, FilingLocator, FxQuoteProvider, LanguageModel, StatementSource};
pub use statement::{PeriodHeader, StatementTable};
pub use types::{
    DEFAULT_CURRENCY, ExtractionMethod, Filing, FinancialRecord, FxSource, RawExtraction, Symbol,
    net_margin_percent,
};
