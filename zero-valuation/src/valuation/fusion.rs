//! Temporal fusion onto the trading calendar.
//!
//! Every input is joined backward only: share counts by effective date,
//! financial figures by publish date (never report date). The dividend
//! series is dense, so it is read by exact calendar day.

use chrono::NaiveDate;
use tracing::debug;

use super::asof::as_of_join;
use super::dividend::DividendSeries;
use super::rollup::RollupRow;
use crate::data::{PriceBar, ShareCapitalEvent};

/// One trading day with every input resolved as of that day.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedRow<'a> {
    pub date: NaiveDate,
    pub close_price: f64,
    pub total_shares: f64,
    pub float_shares: f64,
    /// Latest roll-up row published on or before `date`
    pub financials: Option<&'a RollupRow>,
    pub dividend_ttm: f64,
}

/// Fuse the four streams of one symbol.
///
/// `bars`, `shares` and `rollup` must be sorted by trade date, effective date
/// and publish date respectively. Days without a usable close or without a
/// positive total share count are dropped.
pub fn fuse<'a>(
    bars: &[PriceBar],
    shares: &[ShareCapitalEvent],
    rollup: &'a [RollupRow],
    dividends: &DividendSeries,
) -> Vec<FusedRow<'a>> {
    let timeline: Vec<NaiveDate> = bars.iter().map(|b| b.trade_date).collect();

    let share_at = as_of_join(&timeline, shares, |e| e.effective_date);
    let financials_at = as_of_join(&timeline, rollup, |r| r.publish_date);

    let mut fused = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        if !(bar.close_price.is_finite() && bar.close_price > 0.0) {
            debug!(symbol = %bar.symbol, date = %bar.trade_date, close = bar.close_price, "Dropping day without usable close");
            continue;
        }

        let Some(event) = share_at[i].filter(|e| e.total_shares > 0.0) else {
            debug!(symbol = %bar.symbol, date = %bar.trade_date, "Dropping day without total shares");
            continue;
        };

        fused.push(FusedRow {
            date: bar.trade_date,
            close_price: bar.close_price,
            total_shares: event.total_shares,
            float_shares: resolve_float_shares(bar, event),
            financials: financials_at[i],
            dividend_ttm: dividends.value_on(bar.trade_date),
        });
    }

    fused
}

/// Daily exchange hint, then announced float, then total shares.
fn resolve_float_shares(bar: &PriceBar, event: &ShareCapitalEvent) -> f64 {
    bar.float_shares_hint
        .filter(|f| f.is_finite() && *f > 0.0)
        .or(event.float_shares.filter(|f| f.is_finite() && *f > 0.0))
        .unwrap_or(event.total_shares)
}
