//! Income-statement grid.
//!
//! A [`StatementTable`] is a grid of row labels by period columns, stored as a
//! polars [`DataFrame`] with a `label` column followed by one `Float64` column
//! per period. Column identities live alongside the frame as [`PeriodHeader`]s
//! because headers are free text that may repeat across a statement.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::error::{CompsError, Result};

/// Name of the row-label column in the backing frame.
pub const LABEL_COLUMN: &str = "label";

/// Identity of one period column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodHeader {
    /// Header text as presented by the statement.
    pub label: String,
    /// Fiscal year, when the source states it explicitly.
    pub fiscal_year: Option<i32>,
    /// Period end date, when the source states it.
    pub end_date: Option<NaiveDate>,
}

impl PeriodHeader {
    /// Creates a header with only text.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Sets the fiscal year.
    #[must_use]
    pub const fn with_fiscal_year(mut self, year: i32) -> Self {
        self.fiscal_year = Some(year);
        self
    }

    /// Sets the period end date.
    #[must_use]
    pub const fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }
}

/// Income statement as rows of line items by period columns.
#[derive(Clone, Debug)]
pub struct StatementTable {
    frame: DataFrame,
    periods: Vec<PeriodHeader>,
    currency: Option<String>,
}

impl StatementTable {
    /// Builds a table from row labels, period headers and column-major values.
    ///
    /// `columns[i][r]` is the value of row `r` in period `i`.
    pub fn new(
        labels: Vec<String>,
        periods: Vec<PeriodHeader>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if periods.len() != columns.len() {
            return Err(CompsError::InvalidParameter(format!(
                "{} period headers for {} value columns",
                periods.len(),
                columns.len()
            )));
        }
        if let Some(bad) = columns.iter().position(|c| c.len() != labels.len()) {
            return Err(CompsError::InvalidParameter(format!(
                "Column {} has {} values for {} rows",
                bad,
                columns[bad].len(),
                labels.len()
            )));
        }

        let mut frame_columns = Vec::with_capacity(columns.len() + 1);
        frame_columns.push(Column::new(LABEL_COLUMN.into(), labels));
        for (i, values) in columns.into_iter().enumerate() {
            frame_columns.push(Column::new(period_column_name(i).into(), values));
        }

        let frame = DataFrame::new(frame_columns).map_err(|e| CompsError::Other(e.to_string()))?;

        Ok(Self {
            frame,
            periods,
            currency: None,
        })
    }

    /// Sets the currency the values are denominated in.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Currency the values are denominated in, if stated.
    #[must_use]
    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    /// Period column identities, in positional order.
    #[must_use]
    pub fn periods(&self) -> &[PeriodHeader] {
        &self.periods
    }

    /// Number of line-item rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.frame.height()
    }

    /// Returns true if the table has no rows or no period columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0 || self.periods.is_empty()
    }

    /// The backing frame.
    #[must_use]
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Row labels, in row order.
    #[must_use]
    pub fn row_labels(&self) -> Vec<&str> {
        self.frame
            .column(LABEL_COLUMN)
            .ok()
            .and_then(|c| c.str().ok())
            .map(|ca| ca.into_iter().map(|l| l.unwrap_or_default()).collect())
            .unwrap_or_default()
    }

    /// Value at `row` in period column `period`.
    #[must_use]
    pub fn value(&self, row: usize, period: usize) -> Option<f64> {
        if row >= self.frame.height() {
            return None;
        }
        self.frame
            .column(&period_column_name(period))
            .ok()?
            .f64()
            .ok()?
            .get(row)
            .filter(|v| v.is_finite())
    }

    /// Renders the table as pipe-separated text with one line per row.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if let Some(currency) = &self.currency {
            let _ = writeln!(out, "Currency: {currency}");
        }

        out.push_str("Line item");
        for period in &self.periods {
            let _ = write!(out, " | {}", period.label);
        }
        out.push('\n');

        for (row, label) in self.row_labels().into_iter().enumerate() {
            out.push_str(label);
            for period in 0..self.periods.len() {
                match self.value(row, period) {
                    Some(v) => {
                        let _ = write!(out, " | {v}");
                    }
                    None => out.push_str(" | "),
                }
            }
            out.push('\n');
        }

        out
    }
}

fn period_column_name(index: usize) -> String {
    format!("period_{index}")
}
