//! Language-model extraction from a text rendering of the statement.
//!
//! Statements usually present two or three fiscal years side by side. The
//! extractor makes two requests: the first lists the columns and their fiscal
//! years, the second reads the line items from the newest column only, named
//! by its exact header. If either request fails, a single combined request is
//! made instead.

use std::sync::Arc;

use comps_core::{CompsError, ExtractionMethod, LanguageModel, RawExtraction, Result, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Keys the model is asked to return for line items.
const LINE_ITEM_KEYS: [&str; 4] = ["revenue", "net_income", "operating_income", "dep_amort"];

/// One statement column as identified by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredColumn {
    /// Exact header text of the column.
    pub header: String,
    /// Fiscal year the column represents.
    pub year: i32,
}

/// Two-stage language-model extractor with a single-call fallback.
#[derive(Debug, Clone)]
pub struct SemanticExtractor {
    model: Arc<dyn LanguageModel>,
}

impl SemanticExtractor {
    /// Creates an extractor backed by `model`.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Extracts the line items of the most recent fiscal year from `text`.
    ///
    /// Runs period discovery then single-column extraction, falling back to a
    /// single combined request when either stage fails. Rate-limit errors are
    /// returned immediately at any stage.
    pub async fn extract_via_model(
        &self,
        text: &str,
        ticker: &Symbol,
        filing_year_hint: i32,
    ) -> Result<RawExtraction> {
        let two_stage = async {
            let column = self.discover_latest_column(text, ticker).await?;
            self.extract_column(text, ticker, &column).await
        };

        match two_stage.await {
            Ok(raw) => Ok(raw),
            Err(e) if e.is_rate_limited() => Err(e),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Two-stage extraction failed, using single call");
                self.extract_single_call(text, ticker, filing_year_hint)
                    .await
            }
        }
    }

    /// Stage 1: asks for every data column with its fiscal year and returns the newest.
    ///
    /// Ties on year go to the column listed last.
    pub async fn discover_latest_column(
        &self,
        text: &str,
        ticker: &Symbol,
    ) -> Result<DiscoveredColumn> {
        let reply = self.model.generate(&period_prompt(text, ticker)).await?;
        let columns = parse_columns(&reply)?;
        debug!(ticker = %ticker, columns = ?columns, "Model listed statement columns");

        columns
            .into_iter()
            .reduce(|best, c| if c.year >= best.year { c } else { best })
            .ok_or_else(|| CompsError::Unparsable("model listed no columns".to_string()))
    }

    /// Stage 2: reads the line items from the column headed exactly `column.header`.
    ///
    /// The fiscal year of the result is always `column.year`.
    pub async fn extract_column(
        &self,
        text: &str,
        ticker: &Symbol,
        column: &DiscoveredColumn,
    ) -> Result<RawExtraction> {
        let reply = self
            .model
            .generate(&column_prompt(text, ticker, column))
            .await?;
        let mut raw = parse_line_items(&reply, ExtractionMethod::TwoStage)?;
        raw.fiscal_year = Some(column.year);
        Ok(raw)
    }

    /// Single request: the model finds the newest column itself and reads it.
    ///
    /// A missing fiscal year defaults to the year before the filing year.
    pub async fn extract_single_call(
        &self,
        text: &str,
        ticker: &Symbol,
        filing_year_hint: i32,
    ) -> Result<RawExtraction> {
        let reply = self
            .model
            .generate(&single_call_prompt(text, ticker))
            .await?;
        let mut raw = parse_line_items(&reply, ExtractionMethod::SingleCall)?;
        raw.fiscal_year = raw.fiscal_year.or(Some(filing_year_hint - 1));
        Ok(raw)
    }
}

fn period_prompt(text: &str, ticker: &Symbol) -> String {
    format!(
        "The table below is an income statement with one data column per reporting period.\n\
         List every data column with its exact header text and the fiscal year it covers, \
         taking the year from the header (\"Year ended June 30, 2024\" covers 2024).\n\
         Respond with this JSON and nothing else:\n\
         {{\"columns\": [{{\"header\": \"<exact header text>\", \"year\": 2024}}]}}\n\n\
         Statement for {ticker}:\n{text}"
    )
}

fn column_prompt(text: &str, ticker: &Symbol, column: &DiscoveredColumn) -> String {
    format!(
        "Read values only from the column headed exactly \"{header}\".\n\
         Do not read the label column or any other period column.\n\
         Line items: total revenue (or total net sales), net income, operating income, \
         depreciation and amortization. Report values in millions.\n\
         Respond with JSON only, no markdown, using the keys revenue, net_income, \
         operating_income, dep_amort, reporting_currency, fiscal_year, \
         with fiscal_year set to {year}.\n\n\
         Statement for {ticker}:\n{text}",
        header = column.header,
        year = column.year,
    )
}

fn single_call_prompt(text: &str, ticker: &Symbol) -> String {
    format!(
        "The table below shows several fiscal years. Use only the column for the most recent \
         fiscal year, identified by the year in its header rather than by its position, \
         and never an older column.\n\
         Extract revenue, net_income, operating_income and dep_amort in millions.\n\
         Respond with JSON only, using the keys revenue, net_income, operating_income, \
         dep_amort, reporting_currency, fiscal_year.\n\n\
         Statement for {ticker}:\n{text}"
    )
}

/// Body of the first markdown code fence in `content`, or the trimmed content.
///
/// Surrounding prose is dropped by keeping the outermost JSON object.
#[must_use]
pub fn strip_code_fences(content: &str) -> &str {
    let mut body = content.trim();

    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        // skip the language tag, if any
        let after = after
            .find('\n')
            .filter(|nl| !after[..*nl].contains('{'))
            .map_or(after, |nl| &after[nl + 1..]);
        body = after.find("```").map_or(after, |end| &after[..end]).trim();
    }

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    }
}

/// Parses a stage-1 reply into columns; entries without a header or year are dropped.
pub fn parse_columns(reply: &str) -> Result<Vec<DiscoveredColumn>> {
    let object = parse_object(reply)?;
    let columns = object
        .get("columns")
        .and_then(Value::as_array)
        .ok_or_else(|| CompsError::Unparsable("missing \"columns\" array".to_string()))?;

    let columns: Vec<DiscoveredColumn> = columns
        .iter()
        .filter_map(|entry| {
            let header = entry.get("header")?.as_str()?.trim();
            let year = entry.get("year").and_then(year_value)?;
            (!header.is_empty()).then(|| DiscoveredColumn {
                header: header.to_string(),
                year,
            })
        })
        .collect();

    if columns.is_empty() {
        return Err(CompsError::Unparsable(
            "no usable columns in model response".to_string(),
        ));
    }
    Ok(columns)
}

/// Parses a line-item reply.
///
/// At least one line-item key must be present; absent or null items stay `None`.
pub fn parse_line_items(reply: &str, method: ExtractionMethod) -> Result<RawExtraction> {
    let object = parse_object(reply)?;

    if !LINE_ITEM_KEYS.iter().any(|k| object.contains_key(*k)) {
        return Err(CompsError::Unparsable(format!(
            "none of {} in model response",
            LINE_ITEM_KEYS.join(", ")
        )));
    }

    let number = |key: &str| object.get(key).map_or(Ok(None), clean_number);

    Ok(RawExtraction {
        revenue: number("revenue")?,
        net_income: number("net_income")?,
        operating_income: number("operating_income")?,
        dep_amort: number("dep_amort")?,
        reporting_currency: object
            .get("reporting_currency")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        fiscal_year: object.get("fiscal_year").and_then(year_value),
        method,
    })
}

/// Reads a numeric field given as a JSON number or a formatted string.
///
/// Commas, dollar signs and spaces are ignored; null, "" and "none" are absent.
pub fn clean_number(value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '$' | ' '))
                .collect();
            if cleaned.is_empty()
                || cleaned.eq_ignore_ascii_case("none")
                || cleaned.eq_ignore_ascii_case("null")
            {
                return Ok(None);
            }
            cleaned
                .parse::<f64>()
                .map(Some)
                .map_err(|_| CompsError::Unparsable(format!("not a number: {s:?}")))
        }
        other => Err(CompsError::Unparsable(format!("not a number: {other}"))),
    }
}

fn parse_object(reply: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(strip_code_fences(reply)) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(CompsError::Unparsable(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(CompsError::Unparsable(e.to_string())),
    }
}

fn year_value(value: &Value) -> Option<i32> {
    let year = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (year.is_finite() && year.fract() == 0.0 && (1.0..=9999.0).contains(&year))
        .then_some(year as i32)
}
