//! Valuation metrics from a fused row.
//!
//! A ratio is undefined (`None`) whenever its denominator is unknown, zero or
//! negative. Negative P/E or P/B values are never emitted. Dividend yield is
//! the exception: no dividends is a real zero.

use super::fusion::FusedRow;
use crate::data::ValuationRecord;

/// `numerator / denominator` when the denominator is known and strictly positive.
pub fn positive_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    (n.is_finite() && d.is_finite() && d > 0.0).then(|| n / d)
}

/// Compute the output record for one fused trading day.
pub fn compute_record(symbol: &str, row: &FusedRow<'_>) -> ValuationRecord {
    let total_mv = row.close_price * row.total_shares;
    let circ_mv = row.close_price * row.float_shares;

    let financials = row.financials;
    let net_profit_ttm = financials.and_then(|f| f.net_profit_ttm);
    let net_profit_lf = financials.and_then(|f| f.net_profit_lf);
    let revenue_ttm = financials.and_then(|f| f.revenue_ttm);
    let equity_adjusted = financials.and_then(|f| f.adjusted_equity);

    let dv_ratio = if row.close_price > 0.0 {
        row.dividend_ttm / row.close_price
    } else {
        0.0
    };

    ValuationRecord {
        symbol: symbol.to_string(),
        date: row.date,
        close_price: row.close_price,
        total_shares: row.total_shares,
        float_shares: row.float_shares,
        total_mv,
        circ_mv,
        pe_ttm: positive_ratio(Some(total_mv), net_profit_ttm),
        pe_lf: positive_ratio(Some(total_mv), net_profit_lf),
        pb_lf: positive_ratio(Some(total_mv), equity_adjusted),
        ps_ttm: positive_ratio(Some(total_mv), revenue_ttm),
        roe_ttm: positive_ratio(net_profit_ttm, equity_adjusted),
        eps_ttm: positive_ratio(net_profit_ttm, Some(row.total_shares)),
        bps: positive_ratio(equity_adjusted, Some(row.total_shares)),
        dv_ratio,
        net_profit_ttm,
        net_profit_lf,
        revenue_ttm,
        equity_adjusted,
        report_date_basis: financials.map(|f| f.report_date),
        publish_date_basis: financials.map(|f| f.publish_date),
    }
}
