//! Statement rendering for a located filing.

use comps_core::{Filing, Result, StatementSource, StatementTable, StatementView};
use tracing::{debug, warn};

/// A filing's income statement, as a table when one could be built, and always as text.
#[derive(Clone, Debug)]
pub struct Rendered {
    /// First non-empty statement view, if any.
    pub table: Option<StatementTable>,
    /// Text of `table`, or of the filing's raw financial data when no view succeeded.
    pub text: String,
}

/// Builds the statement of `filing`, trying each [`StatementView`] in order.
///
/// A view that errors is treated as unavailable, except for rate limits, which
/// are returned so the caller can retry the ticker.
pub async fn render(source: &dyn StatementSource, filing: &Filing) -> Result<Rendered> {
    for view in StatementView::ORDERED {
        match source.statement(filing, view).await {
            Ok(Some(table)) if !table.is_empty() => {
                debug!(
                    ticker = %filing.symbol,
                    view = %view,
                    rows = table.row_count(),
                    periods = table.periods().len(),
                    "Built statement"
                );
                let text = table.render_text();
                return Ok(Rendered {
                    table: Some(table),
                    text,
                });
            }
            Ok(_) => debug!(ticker = %filing.symbol, view = %view, "Statement view empty"),
            Err(e) if e.is_rate_limited() => return Err(e),
            Err(e) => warn!(ticker = %filing.symbol, view = %view, error = %e, "Statement view failed"),
        }
    }

    let text = source.financials_text(filing).await?;
    Ok(Rendered { table: None, text })
}
