//! Tabular export of financial records.

use chrono::Datelike;
use comps_core::{CompsError, FinancialRecord, Result};
use polars::prelude::*;

/// Days from 0001-01-01 to 1970-01-01, for polars `Date` columns.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Builds a DataFrame with one row per record.
///
/// Columns: `ticker`, `filing_date`, `fiscal_year`, `revenue`, `net_income`,
/// `ebitda`, `net_margin_pct`, `reporting_currency`, `fx_source`. Monetary
/// columns are USD millions unless `fx_source` is `unconverted`, in which case
/// they stay in `reporting_currency`.
pub fn records_to_frame(records: &[FinancialRecord]) -> Result<DataFrame> {
    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    let dates: Vec<i32> = records
        .iter()
        .map(|r| r.filing_date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        .collect();
    let fiscal_years: Vec<i32> = records.iter().map(|r| r.fiscal_year).collect();
    let revenue: Vec<f64> = records.iter().map(|r| r.revenue).collect();
    let net_income: Vec<f64> = records.iter().map(|r| r.net_income).collect();
    let ebitda: Vec<f64> = records.iter().map(|r| r.ebitda).collect();
    let margins: Vec<f64> = records.iter().map(|r| r.net_margin_percent).collect();
    let currencies: Vec<&str> = records
        .iter()
        .map(|r| r.reporting_currency.as_str())
        .collect();
    let fx_sources: Vec<String> = records.iter().map(|r| r.fx_source.to_string()).collect();

    let date_col = Column::new("filing_date".into(), dates)
        .cast(&DataType::Date)
        .map_err(|e| CompsError::Other(e.to_string()))?;

    DataFrame::new(vec![
        Column::new("ticker".into(), tickers),
        date_col,
        Column::new("fiscal_year".into(), fiscal_years),
        Column::new("revenue".into(), revenue),
        Column::new("net_income".into(), net_income),
        Column::new("ebitda".into(), ebitda),
        Column::new("net_margin_pct".into(), margins),
        Column::new("reporting_currency".into(), currencies),
        Column::new("fx_source".into(), fx_sources),
    ])
    .map_err(|e| CompsError::Other(e.to_string()))
}
