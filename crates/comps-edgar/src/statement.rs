//! Income-statement construction from XBRL company facts.
//!
//! A filing's statement is rebuilt from the facts tagged with its accession
//! number. Only annual durations in the filing's dominant currency unit are
//! kept, one column per distinct period end, oldest first.

use chrono::NaiveDate;
use comps_core::{PeriodHeader, Result, StatementTable, StatementView};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use crate::{CompanyFactsResponse, TagFacts, parse_date};

/// Taxonomies searched for income-statement facts.
const TAXONOMIES: [&str; 2] = ["us-gaap", "ifrs-full"];

/// Shortest and longest period, in days, accepted as a fiscal year.
const ANNUAL_DAYS: std::ops::RangeInclusive<i64> = 340..=380;

/// A standardized line item and the tags that report it, best first.
#[derive(Debug)]
struct Concept {
    label: &'static str,
    tags: &'static [&'static str],
}

const CONCEPTS: &[Concept] = &[
    Concept {
        label: "Revenue",
        tags: &[
            "Revenues",
            "RevenueFromContractWithCustomerExcludingAssessedTax",
            "SalesRevenueNet",
            "RevenueFromContractWithCustomerIncludingAssessedTax",
            "Revenue",
            "RevenueFromSaleOfGoods",
        ],
    },
    Concept {
        label: "Cost of Revenue",
        tags: &[
            "CostOfRevenue",
            "CostOfGoodsAndServicesSold",
            "CostOfSales",
        ],
    },
    Concept {
        label: "Gross Profit",
        tags: &["GrossProfit"],
    },
    Concept {
        label: "Operating Expenses",
        tags: &["OperatingExpenses", "CostsAndExpenses"],
    },
    Concept {
        label: "Operating Income",
        tags: &["OperatingIncomeLoss", "ProfitLossFromOperatingActivities"],
    },
    Concept {
        label: "Depreciation and Amortization",
        tags: &[
            "DepreciationDepletionAndAmortization",
            "DepreciationAndAmortization",
            "DepreciationAmortizationAndAccretionNet",
            "DepreciationAndAmortisationExpense",
            "DepreciationAmortisationAndImpairmentLossReversalOfImpairmentLossRecognisedInProfitOrLoss",
        ],
    },
    Concept {
        label: "Interest Expense",
        tags: &["InterestExpense", "FinanceCosts"],
    },
    Concept {
        label: "Income Before Tax",
        tags: &[
            "IncomeLossFromContinuingOperationsBeforeIncomeTaxesExtraordinaryItemsNoncontrollingInterest",
            "IncomeLossFromContinuingOperationsBeforeIncomeTaxesMinorityInterestAndIncomeLossFromEquityMethodInvestments",
            "ProfitLossBeforeTax",
        ],
    },
    Concept {
        label: "Income Tax Expense",
        tags: &["IncomeTaxExpenseBenefit", "IncomeTaxExpenseContinuingOperations"],
    },
    Concept {
        label: "Net Income",
        tags: &[
            "NetIncomeLoss",
            "ProfitLoss",
            "ProfitLossAttributableToOwnersOfParent",
        ],
    },
];

/// One annual-duration fact reported by the filing.
#[derive(Debug, Clone)]
struct AnnualFact<'a> {
    tag: &'a str,
    label: &'a str,
    unit: &'a str,
    end: NaiveDate,
    value: f64,
}

/// Builds the statement `view` of the filing identified by `accession`.
///
/// Returns `Ok(None)` when the filing reports nothing the view can show.
pub(crate) fn build_statement(
    facts: &CompanyFactsResponse,
    accession: &str,
    view: StatementView,
) -> Result<Option<StatementTable>> {
    let annual = annual_facts(facts, accession);
    let Some(unit) = dominant_unit(&annual) else {
        return Ok(None);
    };
    let annual: Vec<AnnualFact<'_>> = annual.into_iter().filter(|f| f.unit == unit).collect();

    let ends: Vec<NaiveDate> = annual
        .iter()
        .map(|f| f.end)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // tag -> end -> value, first reported value wins
    let mut by_tag: HashMap<&str, BTreeMap<NaiveDate, f64>> = HashMap::new();
    let mut labels: HashMap<&str, &str> = HashMap::new();
    for fact in &annual {
        by_tag
            .entry(fact.tag)
            .or_default()
            .entry(fact.end)
            .or_insert(fact.value);
        labels.entry(fact.tag).or_insert(fact.label);
    }

    // each row lists its tags in priority order; a cell takes the first one valued at that end
    let rows: Vec<(String, Vec<&str>)> = match view {
        StatementView::IncomeStatement => CONCEPTS
            .iter()
            .filter_map(|concept| {
                let tags: Vec<&str> = concept
                    .tags
                    .iter()
                    .copied()
                    .filter(|tag| by_tag.contains_key(tag))
                    .collect();
                (!tags.is_empty()).then(|| (concept.label.to_string(), tags))
            })
            .collect(),
        StatementView::StatementsOfOperations => {
            let known: Vec<&str> = CONCEPTS
                .iter()
                .flat_map(|c| c.tags.iter().copied())
                .filter(|tag| by_tag.contains_key(tag))
                .collect();
            let mut rest: Vec<&str> = by_tag
                .keys()
                .copied()
                .filter(|tag| !known.contains(tag))
                .collect();
            rest.sort_by(|a, b| labels[a].cmp(labels[b]).then(a.cmp(b)));

            known
                .into_iter()
                .chain(rest)
                .map(|tag| (labels[tag].to_string(), vec![tag]))
                .collect()
        }
    };

    if rows.is_empty() || ends.is_empty() {
        return Ok(None);
    }

    let periods = ends
        .iter()
        .map(|end| {
            PeriodHeader::new(format!("Year ended {}", end.format("%B %-d, %Y"))).with_end_date(*end)
        })
        .collect();
    let columns = ends
        .iter()
        .map(|end| {
            rows.iter()
                .map(|(_, tags)| {
                    tags.iter()
                        .find_map(|tag| by_tag.get(tag).and_then(|values| values.get(end)))
                        .copied()
                })
                .collect()
        })
        .collect();
    let row_labels = rows.into_iter().map(|(label, _)| label).collect();

    StatementTable::new(row_labels, periods, columns).map(|t| Some(t.with_currency(unit)))
}

/// Plain-text listing of every monetary fact the filing reports.
pub(crate) fn render_filing_facts(facts: &CompanyFactsResponse, accession: &str) -> String {
    let mut lines = Vec::new();

    for taxonomy in TAXONOMIES {
        let Some(tags) = facts.facts.get(taxonomy) else {
            continue;
        };
        for (tag, tag_facts) in tags {
            let label = tag_label(tag, tag_facts);
            for (unit, values) in &tag_facts.units {
                if !is_currency_unit(unit) {
                    continue;
                }
                for fact in values.iter().filter(|f| f.accn.as_deref() == Some(accession)) {
                    let period = match &fact.start {
                        Some(start) => format!("{} to {}", start, fact.end),
                        None => format!("as of {}", fact.end),
                    };
                    lines.push(format!("{} | {} | {} {}", label, period, unit, fact.val));
                }
            }
        }
    }
    lines.sort();

    let mut out = String::new();
    if !facts.entity_name.is_empty() {
        let _ = writeln!(out, "Entity: {}", facts.entity_name);
    }
    let _ = writeln!(out, "Accession: {accession}");
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn annual_facts<'a>(facts: &'a CompanyFactsResponse, accession: &str) -> Vec<AnnualFact<'a>> {
    let mut annual = Vec::new();

    for taxonomy in TAXONOMIES {
        let Some(tags) = facts.facts.get(taxonomy) else {
            continue;
        };
        for (tag, tag_facts) in tags {
            let label = tag_label(tag, tag_facts);
            for (unit, values) in &tag_facts.units {
                if !is_currency_unit(unit) {
                    continue;
                }
                for fact in values {
                    if fact.accn.as_deref() != Some(accession) || !fact.val.is_finite() {
                        continue;
                    }
                    let Some(end) = parse_date(&fact.end) else {
                        continue;
                    };
                    let Some(start) = fact.start.as_deref().and_then(parse_date) else {
                        continue;
                    };
                    if !ANNUAL_DAYS.contains(&(end - start).num_days()) {
                        continue;
                    }
                    annual.push(AnnualFact {
                        tag,
                        label,
                        unit,
                        end,
                        value: fact.val,
                    });
                }
            }
        }
    }

    annual
}

/// Currency unit carrying the most facts; ties go to the alphabetically first.
fn dominant_unit<'a>(facts: &[AnnualFact<'a>]) -> Option<&'a str> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for fact in facts {
        *counts.entry(fact.unit).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(unit_a, count_a), (unit_b, count_b)| {
            count_a.cmp(count_b).then(unit_b.cmp(unit_a))
        })
        .map(|(unit, _)| unit)
}

fn tag_label<'a>(tag: &'a str, facts: &'a TagFacts) -> &'a str {
    facts
        .label
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(tag)
}

/// ISO currency units are three uppercase letters; "shares" and "USD/shares" are not.
fn is_currency_unit(unit: &str) -> bool {
    unit.len() == 3 && unit.bytes().all(|b| b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ACCN: &str = "0000320193-24-000123";

    const FACTS: &str = r#"{
        "cik": 320193,
        "entityName": "Apple Inc.",
        "facts": {
            "dei": {
                "EntityCommonStockSharesOutstanding": {
                    "label": "Entity Common Stock, Shares Outstanding",
                    "units": {"shares": [
                        {"end": "2024-10-18", "val": 15116786000, "accn": "0000320193-24-000123"}
                    ]}
                }
            },
            "us-gaap": {
                "RevenueFromContractWithCustomerExcludingAssessedTax": {
                    "label": "Revenue from Contract with Customer, Excluding Assessed Tax",
                    "units": {"USD": [
                        {"start": "2021-09-26", "end": "2022-09-24", "val": 394328000000, "accn": "0000320193-24-000123"},
                        {"start": "2022-09-25", "end": "2023-09-30", "val": 383285000000, "accn": "0000320193-24-000123"},
                        {"start": "2023-10-01", "end": "2024-09-28", "val": 391035000000, "accn": "0000320193-24-000123"},
                        {"start": "2024-06-30", "end": "2024-09-28", "val": 94930000000, "accn": "0000320193-24-000123"},
                        {"start": "2022-09-25", "end": "2023-09-30", "val": 383285000000, "accn": "0000320193-23-000106"}
                    ]}
                },
                "OperatingIncomeLoss": {
                    "label": "Operating Income (Loss)",
                    "units": {"USD": [
                        {"start": "2022-09-25", "end": "2023-09-30", "val": 114301000000, "accn": "0000320193-24-000123"},
                        {"start": "2023-10-01", "end": "2024-09-28", "val": 123216000000, "accn": "0000320193-24-000123"}
                    ]}
                },
                "NetIncomeLoss": {
                    "label": "Net Income (Loss) Attributable to Parent",
                    "units": {"USD": [
                        {"start": "2023-10-01", "end": "2024-09-28", "val": 93736000000, "accn": "0000320193-24-000123"}
                    ]}
                },
                "ProfitLoss": {
                    "label": "Net Income (Loss), Including Noncontrolling Interest",
                    "units": {"USD": [
                        {"start": "2023-10-01", "end": "2024-09-28", "val": 1.0, "accn": "0000320193-24-000123"}
                    ]}
                },
                "ResearchAndDevelopmentExpense": {
                    "label": "Research and Development Expense",
                    "units": {"USD": [
                        {"start": "2023-10-01", "end": "2024-09-28", "val": 31370000000, "accn": "0000320193-24-000123"}
                    ]}
                },
                "EarningsPerShareBasic": {
                    "label": "Earnings Per Share, Basic",
                    "units": {"USD/shares": [
                        {"start": "2023-10-01", "end": "2024-09-28", "val": 6.11, "accn": "0000320193-24-000123"}
                    ]}
                },
                "Cash": {
                    "label": "Cash",
                    "units": {"USD": [
                        {"end": "2024-09-28", "val": 29943000000, "accn": "0000320193-24-000123"}
                    ]}
                }
            }
        }
    }"#;

    fn facts() -> CompanyFactsResponse {
        serde_json::from_str(FACTS).unwrap()
    }

    #[test]
    fn test_income_statement_columns_oldest_first() {
        let table = build_statement(&facts(), ACCN, StatementView::IncomeStatement)
            .unwrap()
            .unwrap();

        let ends: Vec<_> = table.periods().iter().map(|p| p.end_date.unwrap()).collect();
        assert_eq!(
            ends,
            vec![
                NaiveDate::from_ymd_opt(2022, 9, 24).unwrap(),
                NaiveDate::from_ymd_opt(2023, 9, 30).unwrap(),
                NaiveDate::from_ymd_opt(2024, 9, 28).unwrap(),
            ]
        );
        assert_eq!(table.periods()[2].label, "Year ended September 28, 2024");
        assert!(table.periods()[2].fiscal_year.is_none());
        assert_eq!(table.currency(), Some("USD"));
    }

    #[test]
    fn test_income_statement_standard_labels() {
        let table = build_statement(&facts(), ACCN, StatementView::IncomeStatement)
            .unwrap()
            .unwrap();

        assert_eq!(
            table.row_labels(),
            vec!["Revenue", "Operating Income", "Net Income"]
        );
        // quarterly revenue and other filings' facts are excluded
        assert_eq!(table.value(0, 2), Some(391_035_000_000.0));
        assert_eq!(table.value(0, 1), Some(383_285_000_000.0));
        // NetIncomeLoss outranks ProfitLoss
        assert_eq!(table.value(2, 2), Some(93_736_000_000.0));
        assert_eq!(table.value(2, 0), None);
    }

    #[test]
    fn test_statements_of_operations_lists_all_items() {
        let table = build_statement(&facts(), ACCN, StatementView::StatementsOfOperations)
            .unwrap()
            .unwrap();

        let labels = table.row_labels();
        assert_eq!(labels.len(), 5);
        assert_eq!(
            labels[0],
            "Revenue from Contract with Customer, Excluding Assessed Tax"
        );
        assert_eq!(labels[4], "Research and Development Expense");
        assert!(!labels.contains(&"Earnings Per Share, Basic"));
        assert!(!labels.contains(&"Cash"));
    }

    #[rstest]
    #[case(StatementView::IncomeStatement)]
    #[case(StatementView::StatementsOfOperations)]
    fn test_unknown_accession_yields_none(#[case] view: StatementView) {
        assert!(
            build_statement(&facts(), "0000000000-00-000000", view)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_dominant_currency_unit() {
        let facts: CompanyFactsResponse = serde_json::from_str(
            r#"{"entityName": "Sony Group Corp", "facts": {"ifrs-full": {
                "Revenue": {"label": "Revenue", "units": {
                    "JPY": [
                        {"start": "2022-04-01", "end": "2023-03-31", "val": 11539837000000, "accn": "A"},
                        {"start": "2023-04-01", "end": "2024-03-31", "val": 13020768000000, "accn": "A"}
                    ],
                    "USD": [
                        {"start": "2023-04-01", "end": "2024-03-31", "val": 86000000000, "accn": "A"}
                    ]
                }},
                "ProfitLoss": {"label": "Profit (loss)", "units": {"JPY": [
                    {"start": "2023-04-01", "end": "2024-03-31", "val": 977589000000, "accn": "A"}
                ]}}
            }}}"#,
        )
        .unwrap();

        let table = build_statement(&facts, "A", StatementView::IncomeStatement)
            .unwrap()
            .unwrap();
        assert_eq!(table.currency(), Some("JPY"));
        assert_eq!(table.row_labels(), vec!["Revenue", "Net Income"]);
        assert_eq!(table.value(0, 1), Some(13_020_768_000_000.0));
    }

    const TRANSITION_FACTS: &str = r#"{"entityName": "Transition Co", "facts": {"us-gaap": {
        "Revenues": {"label": "Revenues", "units": {"USD": [
            {"start": "2016-01-01", "end": "2016-12-31", "val": 900000000, "accn": "A"},
            {"start": "2017-01-01", "end": "2017-12-31", "val": 950000000, "accn": "A"}
        ]}},
        "RevenueFromContractWithCustomerExcludingAssessedTax": {
            "label": "Revenue from Contract with Customer, Excluding Assessed Tax",
            "units": {"USD": [
                {"start": "2018-01-01", "end": "2018-12-31", "val": 1000000000, "accn": "A"}
            ]}
        },
        "NetIncomeLoss": {"label": "Net Income (Loss)", "units": {"USD": [
            {"start": "2016-01-01", "end": "2016-12-31", "val": 90000000, "accn": "A"},
            {"start": "2017-01-01", "end": "2017-12-31", "val": 95000000, "accn": "A"},
            {"start": "2018-01-01", "end": "2018-12-31", "val": 100000000, "accn": "A"}
        ]}}
    }}}"#;

    #[rstest]
    #[case(0, 900_000_000.0)]
    #[case(1, 950_000_000.0)]
    #[case(2, 1_000_000_000.0)]
    fn test_revenue_merges_tags_across_periods(#[case] period: usize, #[case] expected: f64) {
        let facts: CompanyFactsResponse = serde_json::from_str(TRANSITION_FACTS).unwrap();
        let table = build_statement(&facts, "A", StatementView::IncomeStatement)
            .unwrap()
            .unwrap();

        assert_eq!(table.row_labels(), vec!["Revenue", "Net Income"]);
        assert_eq!(table.value(0, period), Some(expected));
    }

    #[rstest]
    #[case("2023-10-01", "2024-09-28", true)]
    #[case("2023-01-01", "2023-12-31", true)]
    #[case("2024-06-30", "2024-09-28", false)]
    #[case("2022-01-01", "2023-12-31", false)]
    fn test_annual_duration_filter(#[case] start: &str, #[case] end: &str, #[case] kept: bool) {
        let json = format!(
            r#"{{"facts": {{"us-gaap": {{"Revenues": {{"label": "Revenues", "units": {{"USD": [
                {{"start": "{start}", "end": "{end}", "val": 10.0, "accn": "A"}}
            ]}}}}}}}}}}"#
        );
        let facts: CompanyFactsResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(annual_facts(&facts, "A").len(), usize::from(kept));
    }

    #[rstest]
    #[case("USD", true)]
    #[case("JPY", true)]
    #[case("shares", false)]
    #[case("USD/shares", false)]
    #[case("pure", false)]
    fn test_currency_units(#[case] unit: &str, #[case] expected: bool) {
        assert_eq!(is_currency_unit(unit), expected);
    }

    #[test]
    fn test_render_filing_facts() {
        let text = render_filing_facts(&facts(), ACCN);
        assert!(text.starts_with("Entity: Apple Inc.\n"));
        assert!(text.contains(
            "Operating Income (Loss) | 2023-10-01 to 2024-09-28 | USD 123216000000"
        ));
        assert!(text.contains("Cash | as of 2024-09-28 | USD 29943000000"));
        assert!(!text.contains("Shares Outstanding"));
        assert!(!text.contains("Per Share"));
    }
}
