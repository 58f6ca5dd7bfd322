//! Error types for filing extraction.
//!
//! This module defines [`CompsError`] which covers all error cases that can occur
//! when locating filings, building statements, querying a language model, or
//! converting currencies.

use thiserror::Error;

/// Errors that can occur while producing a financial record.
#[derive(Error, Debug)]
pub enum CompsError {
    /// Network-related errors (connection failures, timeouts, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit or quota exhausted by an upstream service.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// No qualifying annual filing exists for the symbol.
    #[error("No annual filing found for {0}")]
    FilingNotFound(String),

    /// A language model response could not be parsed into the expected shape.
    #[error("Unparsable model response: {0}")]
    Unparsable(String),

    /// The structured statement yielded no usable line items.
    #[error("Unusable statement for {0}")]
    UnusableStatement(String),

    /// No conversion rate is available for a reporting currency.
    #[error("No USD conversion available for currency {0}")]
    CurrencyUnavailable(String),

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The requested provider is not configured.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Authentication failed for a provider.
    #[error("Authentication failed for provider {0}")]
    AuthenticationFailed(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl CompsError {
    /// Returns true if this error signals an upstream rate limit.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Builds a [`CompsError::RateLimited`] for `provider`.
    #[must_use]
    pub fn rate_limited(
        provider: impl Into<String>,
        retry_after: Option<std::time::Duration>,
    ) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            retry_after,
        }
    }
}

/// Result type alias using [`CompsError`].
pub type Result<T> = std::result::Result<T, CompsError>;
