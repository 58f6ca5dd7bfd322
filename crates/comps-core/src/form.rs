//! Filing form and statement view definitions.
//!
//! This module defines [`FilingForm`] for the annual report types the locator
//! searches and [`StatementView`] for the statement constructions a renderer can
//! attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CompsError;

/// Annual report form types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilingForm {
    /// Domestic annual report.
    #[serde(rename = "10-K")]
    TenK,
    /// Foreign private issuer annual report.
    #[serde(rename = "20-F")]
    TwentyF,
}

impl FilingForm {
    /// Forms searched when no explicit list is configured.
    pub const ANNUAL: [Self; 2] = [Self::TenK, Self::TwentyF];

    /// Returns the EDGAR form code (e.g., "10-K").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TenK => "10-K",
            Self::TwentyF => "20-F",
        }
    }

    /// Returns true if this form is filed by foreign private issuers.
    #[must_use]
    pub const fn is_foreign(&self) -> bool {
        matches!(self, Self::TwentyF)
    }
}

impl fmt::Display for FilingForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for FilingForm {
    type Err = CompsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "10-K" => Ok(Self::TenK),
            "20-F" => Ok(Self::TwentyF),
            other => Err(CompsError::InvalidParameter(format!(
                "Unsupported filing form: {other}"
            ))),
        }
    }
}

/// Statement construction attempted by a renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementView {
    /// Standardized income statement.
    #[default]
    IncomeStatement,
    /// Broader statements of operations.
    StatementsOfOperations,
}

impl StatementView {
    /// Views in the order a renderer tries them.
    pub const ORDERED: [Self; 2] = [Self::IncomeStatement, Self::StatementsOfOperations];
}

impl fmt::Display for StatementView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncomeStatement => f.write_str("income statement"),
            Self::StatementsOfOperations => f.write_str("statements of operations"),
        }
    }
}
