//! Line-item extraction by row-label matching.

use comps_core::{DEFAULT_CURRENCY, ExtractionMethod, RawExtraction, StatementTable};

use crate::period::PeriodColumn;

/// Row-label fragments for revenue, in priority order.
pub const REVENUE_LABELS: &[&str] = &["revenue", "sales", "net sales", "total net sales", "revenues"];

/// Row-label fragments for net income, in priority order.
pub const NET_INCOME_LABELS: &[&str] = &["net income", "net earnings", "profit"];

/// Row-label fragments for operating income, in priority order.
pub const OPERATING_INCOME_LABELS: &[&str] =
    &["operating income", "income from operations", "operating profit"];

/// Row-label fragments for depreciation and amortization, in priority order.
pub const DEP_AMORT_LABELS: &[&str] = &[
    "depreciation",
    "amortization",
    "depreciation and amortization",
    "d&a",
];

/// Reads the four line items from `column` of `table`.
///
/// Returns `None` when revenue, net income and operating income are all zero,
/// which marks the table as unusable rather than genuinely zero-valued.
#[must_use]
pub fn extract(table: &StatementTable, column: &PeriodColumn) -> Option<RawExtraction> {
    let labels: Vec<String> = table
        .row_labels()
        .into_iter()
        .map(str::to_lowercase)
        .collect();
    let find = |names: &[&str]| find_value(table, &labels, column.index, names);

    let raw = RawExtraction {
        revenue: find(REVENUE_LABELS),
        net_income: find(NET_INCOME_LABELS),
        operating_income: find(OPERATING_INCOME_LABELS),
        dep_amort: find(DEP_AMORT_LABELS),
        reporting_currency: Some(table.currency().unwrap_or(DEFAULT_CURRENCY).to_string()),
        fiscal_year: Some(column.fiscal_year),
        method: ExtractionMethod::Structured,
    };

    (!raw.is_unusable()).then_some(raw)
}

/// Value in `period` for the highest-priority synonym in `names` that matches.
///
/// Synonyms are tried in order, and each one scans every row before the next
/// synonym is considered. A later row matching an earlier synonym therefore
/// beats an earlier row matching a later one ("Gross Profit" does not shadow
/// "Net Income"). Within one synonym the first row holding a value wins.
fn find_value(
    table: &StatementTable,
    labels: &[String],
    period: usize,
    names: &[&str],
) -> Option<f64> {
    names.iter().find_map(|name| {
        labels
            .iter()
            .enumerate()
            .filter(|(_, label)| label.contains(name))
            .find_map(|(row, _)| table.value(row, period))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use comps_core::PeriodHeader;

    fn column(index: usize) -> PeriodColumn {
        PeriodColumn {
            index,
            header: format!("col {index}"),
            fiscal_year: 2024,
        }
    }

    fn table(rows: &[(&str, [Option<f64>; 2])]) -> StatementTable {
        let labels = rows.iter().map(|(l, _)| (*l).to_string()).collect();
        let columns = (0..2)
            .map(|i| rows.iter().map(|(_, v)| v[i]).collect())
            .collect();
        StatementTable::new(
            labels,
            vec![PeriodHeader::new("2023"), PeriodHeader::new("2024")],
            columns,
        )
        .unwrap()
    }

    #[test]
    fn test_extracts_from_selected_column_only() {
        let t = table(&[
            ("Total net sales", [Some(383_285.0), Some(391_035.0)]),
            ("Operating income", [Some(114_301.0), Some(123_216.0)]),
            ("Net income", [Some(96_995.0), Some(93_736.0)]),
        ]);
        let raw = extract(&t, &column(1)).unwrap();

        assert_eq!(raw.revenue, Some(391_035.0));
        assert_eq!(raw.operating_income, Some(123_216.0));
        assert_eq!(raw.net_income, Some(93_736.0));
        assert_eq!(raw.dep_amort, None);
        assert_eq!(raw.fiscal_year, Some(2024));
        assert_eq!(raw.method, ExtractionMethod::Structured);
        assert_eq!(raw.currency_code(), "USD");
    }

    #[test]
    fn test_higher_priority_synonym_wins_over_earlier_row() {
        let t = table(&[
            ("Revenue", [Some(100.0), Some(120.0)]),
            ("Gross Profit", [Some(40.0), Some(50.0)]),
            ("Operating Income", [Some(20.0), Some(25.0)]),
            ("Net Income", [Some(10.0), Some(12.0)]),
        ]);
        let raw = extract(&t, &column(1)).unwrap();
        assert_eq!(raw.net_income, Some(12.0));
    }

    #[test]
    fn test_skips_rows_without_value_in_column() {
        let t = table(&[
            ("Revenue from discontinued operations", [Some(5.0), None]),
            ("Revenues", [Some(100.0), Some(120.0)]),
            ("Net income", [Some(1.0), Some(2.0)]),
        ]);
        let raw = extract(&t, &column(1)).unwrap();
        assert_eq!(raw.revenue, Some(120.0));
    }

    #[test]
    fn test_depreciation_and_currency() {
        let t = table(&[
            ("Revenue", [Some(100.0), Some(120.0)]),
            ("Depreciation and Amortization", [Some(7.0), Some(9.0)]),
        ])
        .with_currency("JPY");
        let raw = extract(&t, &column(0)).unwrap();
        assert_eq!(raw.dep_amort, Some(7.0));
        assert_eq!(raw.reporting_currency.as_deref(), Some("JPY"));
    }

    #[test]
    fn test_unrecognized_rows_are_unusable() {
        let t = table(&[
            ("Line 1", [Some(100.0), Some(120.0)]),
            ("Line 2", [Some(40.0), Some(50.0)]),
            ("Depreciation", [Some(3.0), Some(4.0)]),
        ]);
        assert!(extract(&t, &column(1)).is_none());
    }

    #[test]
    fn test_all_zero_values_are_unusable() {
        let t = table(&[
            ("Revenue", [Some(0.0), Some(0.0)]),
            ("Net income", [Some(0.0), Some(0.0)]),
        ]);
        assert!(extract(&t, &column(1)).is_none());
    }
}
