//! Point-in-time valuation core.
//!
//! Pure, synchronous transformations over one symbol's event streams:
//!
//! 1. **normalizer**: aliased statement rows → one [`FinancialFact`] per period
//! 2. **rollup**: facts → TTM / LF series indexed by publish date
//! 3. **dividend**: ex-dividend events → dense daily trailing sum
//! 4. **fusion**: backward as-of joins onto the trading calendar
//! 5. **metrics**: market value and ratios with the sign/zero policy
//!
//! # Usage
//!
//! ```ignore
//! use zero_valuation::valuation::{compute_symbol, FinancialNormalizer, SymbolInputs};
//!
//! let output = compute_symbol(inputs, &FinancialNormalizer::default(), 395, today);
//! for record in &output.records {
//!     println!("{} pe_ttm={:?}", record.date, record.pe_ttm);
//! }
//! ```
//!
//! [`FinancialFact`]: crate::data::FinancialFact

pub mod asof;
pub mod dividend;
pub mod fusion;
pub mod metrics;
pub mod normalizer;
pub mod rollup;

pub use asof::as_of_join;
pub use dividend::{DividendPoint, DividendSeries};
pub use fusion::{fuse, FusedRow};
pub use metrics::{compute_record, positive_ratio};
pub use normalizer::{FinancialNormalizer, NormalizeStats};
pub use rollup::{rollup, RollupRow};

use chrono::NaiveDate;
use tracing::debug;

use crate::data::{DividendEvent, PriceBar, ShareCapitalEvent, StatementRow, ValuationRecord};

/// Everything read from the store for one symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolInputs {
    pub symbol: String,
    /// Bars to value (only those after the checkpoint in incremental mode)
    pub bars: Vec<PriceBar>,
    /// Full statement history
    pub statements: Vec<StatementRow>,
    /// Full share capital history
    pub share_events: Vec<ShareCapitalEvent>,
    /// Full dividend history
    pub dividends: Vec<DividendEvent>,
}

/// Result of valuing one symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolValuation {
    /// Records in trading-day order
    pub records: Vec<ValuationRecord>,
    pub normalize_stats: NormalizeStats,
    /// Bars dropped during fusion (no close or no share count)
    pub dropped_days: usize,
}

/// Run the whole chain for one symbol.
///
/// Dividends are rolled through `max(today, last bar)`.
pub fn compute_symbol(
    mut inputs: SymbolInputs,
    normalizer: &FinancialNormalizer,
    dividend_window_days: u32,
    today: NaiveDate,
) -> SymbolValuation {
    inputs.bars.sort_by_key(|b| b.trade_date);
    inputs.bars.dedup_by_key(|b| b.trade_date);
    inputs.share_events.sort_by_key(|e| e.effective_date);

    let (facts, normalize_stats) = normalizer.normalize(&inputs.symbol, &inputs.statements);
    let rollup_rows = rollup(&facts);

    let through = inputs
        .bars
        .last()
        .map_or(today, |b| b.trade_date.max(today));
    let dividends = DividendSeries::build(&inputs.dividends, dividend_window_days, through);
    if dividends.is_empty() {
        debug!(symbol = %inputs.symbol, %through, "No cash dividend paid; dividend yield is zero");
    }

    let fused = fuse(&inputs.bars, &inputs.share_events, &rollup_rows, &dividends);
    let records: Vec<ValuationRecord> = fused
        .iter()
        .map(|row| compute_record(&inputs.symbol, row))
        .collect();

    SymbolValuation {
        dropped_days: inputs.bars.len() - records.len(),
        records,
        normalize_stats,
    }
}
