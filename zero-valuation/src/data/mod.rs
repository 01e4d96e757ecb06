//! Event store module for point-in-time valuation.
//!
//! Holds the four per-symbol input streams, the valuation output record, and
//! the repository abstractions that read and write them.
//!
//! # Stores
//! - **local_storage**: SQLite-backed store (production)
//! - **memory**: in-memory store (tests, embedding)

mod provider;
pub mod local_storage;
pub mod memory;

pub use provider::{
    CheckpointRepository, DividendRepository, PriceRepository, Repositories,
    ShareCapitalRepository, StatementRepository, StoreError, ValuationRepository,
};
pub use local_storage::{LocalStorage, LocalStorageConfig, LocalStorageStats};
pub use memory::InMemoryStore;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Input Events
// ============================================================================

/// Daily closing price for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Stock symbol (e.g., "600519")
    pub symbol: String,
    /// Trading day
    pub trade_date: NaiveDate,
    /// Unadjusted close price
    pub close_price: f64,
    /// Float shares observed on the exchange feed for this day, in shares
    pub float_shares_hint: Option<f64>,
}

/// Which financial statement a raw row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// Income statement (利润表)
    Income,
    /// Balance sheet (资产负债表)
    Balance,
}

impl StatementKind {
    /// Parse from the stored string form
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "income" => Some(Self::Income),
            "balance" => Some(Self::Balance),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Income => write!(f, "income"),
            Self::Balance => write!(f, "balance"),
        }
    }
}

/// Raw statement row as delivered by the vendor, keyed by vendor line-item labels.
///
/// Item values are usually numbers but some feeds deliver numeric strings;
/// the normalizer coerces both and treats anything else as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub symbol: String,
    pub kind: StatementKind,
    /// Accounting period end (quarter end)
    pub report_date: NaiveDate,
    /// Date the statement became public
    pub publish_date: NaiveDate,
    /// Vendor line items
    pub items: serde_json::Map<String, serde_json::Value>,
}

/// Canonical per-period financial fact after alias resolution and deduplication.
///
/// Income and balance figures of a period can become public on different
/// days, so each side keeps its own disclosure date. `publish_date` is the
/// day the whole period is public.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialFact {
    pub symbol: String,
    pub report_date: NaiveDate,
    pub publish_date: NaiveDate,
    /// Disclosure date of `net_profit` and `revenue`
    pub income_publish_date: Option<NaiveDate>,
    /// Disclosure date of `adjusted_equity`
    pub balance_publish_date: Option<NaiveDate>,
    /// Year-to-date cumulative net profit attributable to the parent
    pub net_profit: Option<f64>,
    /// Year-to-date cumulative revenue
    pub revenue: Option<f64>,
    /// Parent equity minus perpetual/hybrid instruments
    pub adjusted_equity: Option<f64>,
}

/// Unit a share count was published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareUnit {
    /// Raw share count
    Shares,
    /// 万股
    TenThousandShares,
    /// 手 (board lot of 100 shares)
    Lots,
}

impl ShareUnit {
    /// Convert a count in this unit to raw shares
    pub fn to_shares(self, value: f64) -> f64 {
        match self {
            Self::Shares => value,
            Self::TenThousandShares => value * 10_000.0,
            Self::Lots => value * 100.0,
        }
    }

    /// Parse from the stored string form
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "shares" => Some(Self::Shares),
            "ten_thousand_shares" | "万股" => Some(Self::TenThousandShares),
            "lots" | "手" => Some(Self::Lots),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShareUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shares => write!(f, "shares"),
            Self::TenThousandShares => write!(f, "ten_thousand_shares"),
            Self::Lots => write!(f, "lots"),
        }
    }
}

/// Share capital change. Valid from `effective_date` until the next event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareCapitalEvent {
    pub symbol: String,
    pub effective_date: NaiveDate,
    /// Total issued shares, in shares
    pub total_shares: f64,
    /// Announced float shares, in shares
    pub float_shares: Option<f64>,
}

/// Cash dividend attributed entirely to its ex-date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub symbol: String,
    pub ex_date: NaiveDate,
    pub cash_dividend_per_share: f64,
}

// ============================================================================
// Output
// ============================================================================

/// Daily point-in-time valuation for one symbol.
///
/// Ratios that cannot be defined (zero or negative denominator, unknown input)
/// are `None`; they are never written as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub close_price: f64,
    pub total_shares: f64,
    pub float_shares: f64,
    /// Total market value
    pub total_mv: f64,
    /// Circulating market value
    pub circ_mv: f64,
    pub pe_ttm: Option<f64>,
    pub pe_lf: Option<f64>,
    pub pb_lf: Option<f64>,
    pub ps_ttm: Option<f64>,
    pub roe_ttm: Option<f64>,
    pub eps_ttm: Option<f64>,
    pub bps: Option<f64>,
    /// Trailing cash dividend / close. Zero when nothing was paid.
    pub dv_ratio: f64,
    pub net_profit_ttm: Option<f64>,
    pub net_profit_lf: Option<f64>,
    pub revenue_ttm: Option<f64>,
    pub equity_adjusted: Option<f64>,
    /// Report period the financial figures belong to
    pub report_date_basis: Option<NaiveDate>,
    /// Disclosure date of those figures; never after `date`
    pub publish_date_basis: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_unit_conversion() {
        assert_eq!(ShareUnit::Shares.to_shares(1_500.0), 1_500.0);
        assert_eq!(ShareUnit::TenThousandShares.to_shares(125.62), 1_256_200.0);
        assert_eq!(ShareUnit::Lots.to_shares(3.0), 300.0);
    }

    #[test]
    fn test_share_unit_parse() {
        assert_eq!(ShareUnit::from_str("万股"), Some(ShareUnit::TenThousandShares));
        assert_eq!(ShareUnit::from_str("lots"), Some(ShareUnit::Lots));
        assert_eq!(
            ShareUnit::from_str(&ShareUnit::TenThousandShares.to_string()),
            Some(ShareUnit::TenThousandShares)
        );
        assert_eq!(ShareUnit::from_str("bags"), None);
    }

    #[test]
    fn test_statement_kind_parse() {
        assert_eq!(StatementKind::from_str("Income"), Some(StatementKind::Income));
        assert_eq!(StatementKind::from_str("balance"), Some(StatementKind::Balance));
        assert_eq!(StatementKind::from_str("cashflow"), None);
    }
}
