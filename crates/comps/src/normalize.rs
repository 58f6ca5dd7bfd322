//! Unit and currency normalization.
//!
//! Extracted figures arrive either in millions or in raw currency units, with
//! no unit tag to tell them apart, and in the filing's reporting currency.
//! [`Normalizer`] brings them to USD millions: a [`MagnitudePolicy`] decides
//! the unit of each value from its size, and a [`CurrencyConverter`] supplies
//! the USD conversion factor.

use std::fmt::Debug;
use std::sync::Arc;

use comps_core::{CompsError, DEFAULT_CURRENCY, FxQuoteProvider, FxSource, RawExtraction, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Approximate USD per JPY used when no quote is available.
pub const JPY_FALLBACK_RATE: f64 = 0.0067;

/// Approximate USD per EUR used when no quote is available.
pub const EUR_FALLBACK_RATE: f64 = 1.08;

/// Decides the unit of an extracted value from its magnitude.
pub trait MagnitudePolicy: Send + Sync + Debug {
    /// Converts `value` to millions.
    fn to_millions(&self, value: f64) -> f64;
}

/// Treats values above a threshold as raw units and everything else as millions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdMagnitude {
    /// Largest absolute value still taken to be in millions.
    pub threshold: f64,
    /// Divisor applied to values above the threshold.
    pub divisor: f64,
}

impl Default for ThresholdMagnitude {
    fn default() -> Self {
        Self {
            threshold: 1e8,
            divisor: 1e6,
        }
    }
}

impl MagnitudePolicy for ThresholdMagnitude {
    fn to_millions(&self, value: f64) -> f64 {
        if value.abs() > self.threshold {
            value / self.divisor
        } else {
            value
        }
    }
}

/// What to do with a foreign currency that has neither a quote nor a fallback rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnconvertedCurrencyPolicy {
    /// Fail the ticker with [`CompsError::CurrencyUnavailable`].
    #[default]
    Reject,
    /// Keep the figures in the reporting currency and mark the record unconverted.
    KeepUnconverted,
}

/// A USD conversion factor and its origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    /// USD per unit of the reporting currency.
    pub rate: f64,
    /// How `rate` was obtained.
    pub source: FxSource,
}

impl FxRate {
    /// The identity rate for USD figures.
    pub const IDENTITY: Self = Self {
        rate: 1.0,
        source: FxSource::Identity,
    };
}

/// Quote instrument for `currency` and whether its close must be inverted.
///
/// JPY is quoted as yen per dollar; other currencies as dollars per unit.
#[must_use]
pub fn quote_instrument(currency: &str) -> (String, bool) {
    match currency {
        "JPY" => ("USDJPY=X".to_string(), true),
        other => (format!("{other}USD=X"), false),
    }
}

/// Fixed approximate USD rate for currencies that have one.
#[must_use]
pub fn fallback_rate(currency: &str) -> Option<f64> {
    match currency {
        "JPY" => Some(JPY_FALLBACK_RATE),
        "EUR" => Some(EUR_FALLBACK_RATE),
        _ => None,
    }
}

/// Finds USD conversion factors for reporting currencies.
#[derive(Debug, Clone, Default)]
pub struct CurrencyConverter {
    quotes: Option<Arc<dyn FxQuoteProvider>>,
    policy: UnconvertedCurrencyPolicy,
}

impl CurrencyConverter {
    /// Creates a converter backed by `quotes`.
    #[must_use]
    pub fn new(quotes: Arc<dyn FxQuoteProvider>) -> Self {
        Self {
            quotes: Some(quotes),
            policy: UnconvertedCurrencyPolicy::default(),
        }
    }

    /// Creates a converter that only knows the fixed fallback rates.
    #[must_use]
    pub fn offline() -> Self {
        Self::default()
    }

    /// Sets the policy for currencies without any rate.
    #[must_use]
    pub const fn with_policy(mut self, policy: UnconvertedCurrencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// USD per unit of `currency`.
    ///
    /// A failed or empty quote lookup falls back to the fixed rate for the
    /// currency. Only a currency with no fallback is subject to the
    /// [`UnconvertedCurrencyPolicy`].
    pub async fn usd_rate(&self, currency: &str) -> Result<FxRate> {
        if currency == DEFAULT_CURRENCY {
            return Ok(FxRate::IDENTITY);
        }

        if let Some(rate) = self.quoted_rate(currency).await {
            debug!(currency, rate, "Using quoted FX rate");
            return Ok(FxRate {
                rate,
                source: FxSource::Quote,
            });
        }

        if let Some(rate) = fallback_rate(currency) {
            warn!(currency, rate, "No FX quote, using fixed fallback rate");
            return Ok(FxRate {
                rate,
                source: FxSource::Fallback,
            });
        }

        match self.policy {
            UnconvertedCurrencyPolicy::Reject => {
                Err(CompsError::CurrencyUnavailable(currency.to_string()))
            }
            UnconvertedCurrencyPolicy::KeepUnconverted => {
                warn!(currency, "No FX rate, keeping figures unconverted");
                Ok(FxRate {
                    rate: 1.0,
                    source: FxSource::Unconverted,
                })
            }
        }
    }

    async fn quoted_rate(&self, currency: &str) -> Option<f64> {
        let quotes = self.quotes.as_ref()?;
        let (instrument, inverted) = quote_instrument(currency);

        match quotes.recent_close(&instrument).await {
            Ok(Some(close)) if close.is_finite() && close > 0.0 => {
                Some(if inverted { 1.0 / close } else { close })
            }
            Ok(_) => {
                debug!(instrument = %instrument, "No recent close");
                None
            }
            Err(e) => {
                warn!(
                    provider = quotes.name(),
                    instrument = %instrument,
                    error = %e,
                    "FX quote lookup failed"
                );
                None
            }
        }
    }
}

/// Extracted figures in USD millions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFigures {
    /// Revenue.
    pub revenue: f64,
    /// Net income.
    pub net_income: f64,
    /// Operating income plus depreciation and amortization.
    pub ebitda: f64,
    /// Three-letter currency the figures were reported in.
    pub reporting_currency: String,
    /// Conversion applied.
    pub fx: FxRate,
}

/// Applies a [`MagnitudePolicy`] and a [`CurrencyConverter`] to raw extractions.
#[derive(Debug, Clone)]
pub struct Normalizer {
    magnitude: Arc<dyn MagnitudePolicy>,
    converter: CurrencyConverter,
}

impl Normalizer {
    /// Creates a normalizer with the default magnitude threshold.
    #[must_use]
    pub fn new(converter: CurrencyConverter) -> Self {
        Self {
            magnitude: Arc::new(ThresholdMagnitude::default()),
            converter,
        }
    }

    /// Replaces the magnitude policy.
    #[must_use]
    pub fn with_magnitude(mut self, magnitude: Arc<dyn MagnitudePolicy>) -> Self {
        self.magnitude = magnitude;
        self
    }

    /// Converts `raw` to USD millions. Absent line items count as zero.
    pub async fn normalize(&self, raw: &RawExtraction) -> Result<NormalizedFigures> {
        let millions = |v: Option<f64>| self.magnitude.to_millions(v.unwrap_or(0.0));

        let revenue = millions(raw.revenue);
        let net_income = millions(raw.net_income);
        let operating_income = millions(raw.operating_income);
        let dep_amort = millions(raw.dep_amort);

        let currency = raw.currency_code();
        let fx = self.converter.usd_rate(&currency).await?;

        Ok(NormalizedFigures {
            revenue: revenue * fx.rate,
            net_income: net_income * fx.rate,
            ebitda: (operating_income + dep_amort) * fx.rate,
            reporting_currency: currency,
            fx,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(CurrencyConverter::offline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use comps_core::{DataProvider, ExtractionMethod};
    use rstest::rstest;

    #[derive(Debug)]
    struct FixedQuote(Result<Option<f64>>);

    impl DataProvider for FixedQuote {
        fn name(&self) -> &str {
            "fixed"
        }

        fn description(&self) -> &str {
            "fixed quote"
        }
    }

    #[async_trait]
    impl FxQuoteProvider for FixedQuote {
        async fn recent_close(&self, _pair: &str) -> Result<Option<f64>> {
            match &self.0 {
                Ok(close) => Ok(*close),
                Err(_) => Err(CompsError::Network("connection reset".to_string())),
            }
        }
    }

    fn converter(close: Result<Option<f64>>) -> CurrencyConverter {
        CurrencyConverter::new(Arc::new(FixedQuote(close)))
    }

    fn raw(currency: &str) -> RawExtraction {
        RawExtraction {
            revenue: Some(4000.0),
            net_income: Some(800.0),
            operating_income: Some(1000.0),
            dep_amort: Some(200.0),
            reporting_currency: Some(currency.to_string()),
            fiscal_year: Some(2024),
            method: ExtractionMethod::Structured,
        }
    }

    #[rstest]
    #[case(9.6773e10, 96_773.0)]
    #[case(96_773.0, 96_773.0)]
    #[case(1e8, 1e8)]
    #[case(100_000_001.0, 100.000_001)]
    #[case(-2.5e9, -2_500.0)]
    #[case(0.0, 0.0)]
    fn test_threshold_magnitude(#[case] value: f64, #[case] expected: f64) {
        assert_relative_eq!(ThresholdMagnitude::default().to_millions(value), expected);
    }

    #[rstest]
    #[case("JPY", "USDJPY=X", true)]
    #[case("EUR", "EURUSD=X", false)]
    #[case("GBP", "GBPUSD=X", false)]
    fn test_quote_instrument(#[case] currency: &str, #[case] symbol: &str, #[case] inverted: bool) {
        assert_eq!(quote_instrument(currency), (symbol.to_string(), inverted));
    }

    #[tokio::test]
    async fn test_usd_is_identity() {
        let rate = converter(Ok(Some(2.0))).usd_rate("USD").await.unwrap();
        assert_eq!(rate, FxRate::IDENTITY);
    }

    #[tokio::test]
    async fn test_jpy_quote_is_inverted() {
        let rate = converter(Ok(Some(150.0))).usd_rate("JPY").await.unwrap();
        assert_relative_eq!(rate.rate, 1.0 / 150.0);
        assert_eq!(rate.source, FxSource::Quote);
    }

    #[tokio::test]
    async fn test_direct_quote() {
        let rate = converter(Ok(Some(1.27))).usd_rate("GBP").await.unwrap();
        assert_relative_eq!(rate.rate, 1.27);
    }

    #[rstest]
    #[case("JPY", JPY_FALLBACK_RATE)]
    #[case("EUR", EUR_FALLBACK_RATE)]
    #[tokio::test]
    async fn test_fallback_rates(#[case] currency: &str, #[case] expected: f64) {
        for close in [Ok(None), Err(CompsError::Other(String::new()))] {
            let rate = converter(close).usd_rate(currency).await.unwrap();
            assert_relative_eq!(rate.rate, expected);
            assert_eq!(rate.source, FxSource::Fallback);
        }
    }

    #[tokio::test]
    async fn test_unknown_currency_policy() {
        let result = converter(Ok(None)).usd_rate("BRL").await;
        assert!(matches!(result, Err(CompsError::CurrencyUnavailable(c)) if c == "BRL"));

        let rate = converter(Ok(None))
            .with_policy(UnconvertedCurrencyPolicy::KeepUnconverted)
            .usd_rate("BRL")
            .await
            .unwrap();
        assert_eq!(rate.rate, 1.0);
        assert_eq!(rate.source, FxSource::Unconverted);
    }

    #[tokio::test]
    async fn test_normalize_usd() {
        let figures = Normalizer::default().normalize(&raw("usd")).await.unwrap();
        assert_relative_eq!(figures.revenue, 4000.0);
        assert_relative_eq!(figures.net_income, 800.0);
        assert_relative_eq!(figures.ebitda, 1200.0);
        assert_eq!(figures.reporting_currency, "USD");
        assert_eq!(figures.fx.source, FxSource::Identity);
    }

    #[tokio::test]
    async fn test_normalize_jpy_millions() {
        let mut raw = raw("JPY");
        raw.revenue = Some(11_500_000.0);

        let figures = Normalizer::new(converter(Ok(Some(150.0))))
            .normalize(&raw)
            .await
            .unwrap();
        assert_relative_eq!(figures.revenue, 11_500_000.0 / 150.0, max_relative = 1e-12);
        assert_relative_eq!(figures.ebitda, 1200.0 / 150.0, max_relative = 1e-12);

        let figures = Normalizer::new(converter(Ok(None)))
            .normalize(&raw)
            .await
            .unwrap();
        assert_relative_eq!(figures.revenue, 11_500_000.0 * JPY_FALLBACK_RATE);
        assert_eq!(figures.fx.source, FxSource::Fallback);
    }

    #[tokio::test]
    async fn test_normalize_scales_raw_units_and_missing_items() {
        let raw = RawExtraction {
            revenue: Some(9.6773e10),
            operating_income: Some(2.5e10),
            ..RawExtraction::default()
        };
        let figures = Normalizer::default().normalize(&raw).await.unwrap();
        assert_relative_eq!(figures.revenue, 96_773.0);
        assert_relative_eq!(figures.net_income, 0.0);
        assert_relative_eq!(figures.ebitda, 25_000.0);
    }
}
