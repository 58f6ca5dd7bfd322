//! Fiscal-period column resolution.

use chrono::Datelike;
use comps_core::{PeriodHeader, StatementTable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Four-digit years from 1990 through 2039.
static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(199\d|20[0-3]\d)\b").expect("valid year pattern"));

/// The statement column selected for extraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodColumn {
    /// Positional index of the column among the table's periods.
    pub index: usize,
    /// Header text of the column.
    pub header: String,
    /// Fiscal year the column represents.
    pub fiscal_year: i32,
}

/// Selects the column for the most recent fiscal year.
///
/// Among columns sharing the maximum year, the one furthest right wins.
/// Returns `None` when no column header yields a year.
#[must_use]
pub fn resolve(table: &StatementTable) -> Option<PeriodColumn> {
    table
        .periods()
        .iter()
        .enumerate()
        .filter_map(|(index, header)| column_year(header).map(|year| (index, header, year)))
        .max_by_key(|(index, _, year)| (*year, *index))
        .map(|(index, header, fiscal_year)| PeriodColumn {
            index,
            header: header.label.clone(),
            fiscal_year,
        })
}

/// Fiscal year of one column: explicit year, then end-date year, then header text.
#[must_use]
pub fn column_year(header: &PeriodHeader) -> Option<i32> {
    header
        .fiscal_year
        .or_else(|| header.end_date.map(|d| d.year()))
        .or_else(|| extract_year_from_text(&header.label))
}

/// Largest four-digit year between 1990 and 2039 appearing in `text`.
#[must_use]
pub fn extract_year_from_text(text: &str) -> Option<i32> {
    YEAR_PATTERN
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .max()
}
