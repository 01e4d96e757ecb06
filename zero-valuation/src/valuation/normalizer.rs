//! Financial statement normalizer.
//!
//! Turns raw vendor statement rows into one canonical [`FinancialFact`] per
//! report period:
//!
//! 1. Rows whose publish date precedes the report date are dropped.
//! 2. Per statement kind, later disclosures of a period replace earlier ones.
//! 3. Canonical fields are resolved by first-numeric match over the alias list.
//! 4. Income and balance rows are outer-joined on report date; each side keeps
//!    its own disclosure date.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use zero_common::FieldAliasConfig;

use crate::data::{FinancialFact, StatementKind, StatementRow};

/// Data quality counters collected while normalizing one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Raw rows received
    pub rows_in: usize,
    /// Rows dropped because `publish_date < report_date`
    pub temporal_inversions: usize,
    /// Rows replaced by a later disclosure of the same period
    pub superseded: usize,
    /// Canonical fields left undefined because no alias carried a number
    pub ambiguous_fields: usize,
    /// Facts produced
    pub facts_out: usize,
}

impl NormalizeStats {
    /// Add another symbol's counters to these.
    pub fn merge(&mut self, other: &Self) {
        self.rows_in += other.rows_in;
        self.temporal_inversions += other.temporal_inversions;
        self.superseded += other.superseded;
        self.ambiguous_fields += other.ambiguous_fields;
        self.facts_out += other.facts_out;
    }
}

/// Resolves aliased statement rows into canonical financial facts.
#[derive(Debug, Clone)]
pub struct FinancialNormalizer {
    aliases: FieldAliasConfig,
}

impl Default for FinancialNormalizer {
    fn default() -> Self {
        Self::new(FieldAliasConfig::default())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct IncomeItems {
    publish_date: Option<NaiveDate>,
    net_profit: Option<f64>,
    revenue: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct BalanceItems {
    publish_date: Option<NaiveDate>,
    adjusted_equity: Option<f64>,
}

impl FinancialNormalizer {
    pub fn new(aliases: FieldAliasConfig) -> Self {
        Self { aliases }
    }

    /// Normalize all statement rows of one symbol.
    ///
    /// Returns facts sorted by report date, at most one per period. An empty
    /// input (no income and no balance rows) yields an empty series.
    pub fn normalize(&self, symbol: &str, rows: &[StatementRow]) -> (Vec<FinancialFact>, NormalizeStats) {
        let mut stats = NormalizeStats {
            rows_in: rows.len(),
            ..Default::default()
        };

        let income = self.latest_per_period(symbol, rows, StatementKind::Income, &mut stats);
        let balance = self.latest_per_period(symbol, rows, StatementKind::Balance, &mut stats);

        let mut periods: BTreeMap<NaiveDate, (IncomeItems, BalanceItems)> = BTreeMap::new();

        for (report_date, row) in income {
            let net_profit = self.resolve(symbol, row, &self.aliases.net_profit, &mut stats);
            let revenue = self.resolve(symbol, row, &self.aliases.revenue, &mut stats);
            periods.entry(report_date).or_default().0 = IncomeItems {
                publish_date: Some(row.publish_date),
                net_profit,
                revenue,
            };
        }

        for (report_date, row) in balance {
            let total_equity = self.resolve(symbol, row, &self.aliases.total_equity, &mut stats);
            // Perpetual bonds are usually absent, which means none were issued
            let other_equity = row
                .items
                .get(&self.aliases.other_equity)
                .and_then(coerce_number)
                .unwrap_or(0.0);
            periods.entry(report_date).or_default().1 = BalanceItems {
                publish_date: Some(row.publish_date),
                adjusted_equity: total_equity.map(|equity| equity - other_equity),
            };
        }

        let facts: Vec<FinancialFact> = periods
            .into_iter()
            .filter_map(|(report_date, (income, balance))| {
                let publish_date = income.publish_date.max(balance.publish_date)?;
                Some(FinancialFact {
                    symbol: symbol.to_string(),
                    report_date,
                    publish_date,
                    income_publish_date: income.publish_date,
                    balance_publish_date: balance.publish_date,
                    net_profit: income.net_profit,
                    revenue: income.revenue,
                    adjusted_equity: balance.adjusted_equity,
                })
            })
            .collect();

        stats.facts_out = facts.len();
        (facts, stats)
    }

    /// Keep the latest disclosure per report period for one statement kind.
    fn latest_per_period<'a>(
        &self,
        symbol: &str,
        rows: &'a [StatementRow],
        kind: StatementKind,
        stats: &mut NormalizeStats,
    ) -> BTreeMap<NaiveDate, &'a StatementRow> {
        let mut latest: BTreeMap<NaiveDate, &StatementRow> = BTreeMap::new();

        for row in rows.iter().filter(|r| r.kind == kind) {
            if row.publish_date < row.report_date {
                debug!(
                    symbol,
                    %kind,
                    report_date = %row.report_date,
                    publish_date = %row.publish_date,
                    "Dropping statement published before its period end"
                );
                stats.temporal_inversions += 1;
                continue;
            }

            match latest.get(&row.report_date) {
                Some(existing) if existing.publish_date > row.publish_date => {
                    stats.superseded += 1;
                }
                Some(_) => {
                    stats.superseded += 1;
                    latest.insert(row.report_date, row);
                }
                None => {
                    latest.insert(row.report_date, row);
                }
            }
        }

        latest
    }

    fn resolve(
        &self,
        symbol: &str,
        row: &StatementRow,
        aliases: &[String],
        stats: &mut NormalizeStats,
    ) -> Option<f64> {
        let value = first_numeric(&row.items, aliases);
        if value.is_none() {
            debug!(
                symbol,
                kind = %row.kind,
                report_date = %row.report_date,
                aliases = ?aliases,
                "No alias carried a numeric value"
            );
            stats.ambiguous_fields += 1;
        }
        value
    }
}

/// First alias, in priority order, whose item coerces to a finite number.
pub fn first_numeric(items: &serde_json::Map<String, Value>, aliases: &[String]) -> Option<f64> {
    aliases
        .iter()
        .find_map(|alias| items.get(alias).and_then(coerce_number))
}

/// Coerce a vendor item to a number. Numeric strings (with optional thousands
/// separators) are accepted; anything else is absent.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(kind: StatementKind, report: &str, publish: &str, items: Value) -> StatementRow {
        StatementRow {
            symbol: "601398".into(),
            kind,
            report_date: date(report),
            publish_date: date(publish),
            items: items.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&json!(12.5)), Some(12.5));
        assert_eq!(coerce_number(&json!("1,234.5")), Some(1234.5));
        assert_eq!(coerce_number(&json!(" -3 ")), Some(-3.0));
        assert_eq!(coerce_number(&json!("--")), None);
        assert_eq!(coerce_number(&json!("NaN")), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(coerce_number(&json!(true)), None);
    }

    #[test]
    fn test_alias_priority() {
        let normalizer = FinancialNormalizer::default();
        let rows = vec![row(
            StatementKind::Income,
            "2024-03-31",
            "2024-04-28",
            json!({"净利润": 90.0, "归属于母公司股东的净利润": 80.0, "营业收入": 300.0}),
        )];

        let (facts, _) = normalizer.normalize("601398", &rows);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].net_profit, Some(80.0));
        assert_eq!(facts[0].revenue, Some(300.0));
        assert_eq!(facts[0].adjusted_equity, None);
    }

    #[test]
    fn test_later_disclosure_supersedes() {
        let normalizer = FinancialNormalizer::default();
        let rows = vec![
            row(StatementKind::Income, "2023-12-31", "2024-03-30", json!({"净利润": 110.0})),
            row(StatementKind::Income, "2023-12-31", "2024-01-15", json!({"净利润": 100.0})),
        ];

        let (facts, stats) = normalizer.normalize("601398", &rows);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].net_profit, Some(110.0));
        assert_eq!(facts[0].publish_date, date("2024-03-30"));
        assert_eq!(stats.superseded, 1);
    }

    #[test]
    fn test_adjusted_equity_excludes_perpetuals() {
        let normalizer = FinancialNormalizer::default();
        let rows = vec![
            row(
                StatementKind::Balance,
                "2024-03-31",
                "2024-04-29",
                json!({"归属于母公司股东权益合计": "1000", "其他权益工具": 150.0}),
            ),
            row(
                StatementKind::Balance,
                "2024-06-30",
                "2024-08-30",
                json!({"股东权益合计": 1200.0}),
            ),
        ];

        let (facts, _) = normalizer.normalize("601398", &rows);
        assert_eq!(facts[0].adjusted_equity, Some(850.0));
        assert_eq!(facts[1].adjusted_equity, Some(1200.0));
    }

    #[test]
    fn test_outer_join_takes_later_publish_date() {
        let normalizer = FinancialNormalizer::default();
        let rows = vec![
            row(StatementKind::Income, "2024-03-31", "2024-04-20", json!({"净利润": 10.0})),
            row(StatementKind::Balance, "2024-03-31", "2024-04-25", json!({"所有者权益合计": 500.0})),
            row(StatementKind::Balance, "2024-06-30", "2024-08-25", json!({"所有者权益合计": 520.0})),
        ];

        let (facts, stats) = normalizer.normalize("601398", &rows);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].publish_date, date("2024-04-25"));
        assert_eq!(facts[0].income_publish_date, Some(date("2024-04-20")));
        assert_eq!(facts[0].balance_publish_date, Some(date("2024-04-25")));
        assert_eq!(facts[0].net_profit, Some(10.0));
        assert_eq!(facts[1].income_publish_date, None);
        assert_eq!(facts[1].net_profit, None);
        assert_eq!(facts[1].adjusted_equity, Some(520.0));
        assert_eq!(stats.facts_out, 2);
    }

    #[test]
    fn test_temporal_inversion_dropped() {
        let normalizer = FinancialNormalizer::default();
        let rows = vec![row(
            StatementKind::Income,
            "2024-06-30",
            "2024-06-01",
            json!({"净利润": 10.0}),
        )];

        let (facts, stats) = normalizer.normalize("601398", &rows);
        assert!(facts.is_empty());
        assert_eq!(stats.temporal_inversions, 1);
    }

    #[test]
    fn test_unknown_labels_leave_field_undefined() {
        let normalizer = FinancialNormalizer::default();
        let rows = vec![row(
            StatementKind::Income,
            "2024-03-31",
            "2024-04-28",
            json!({"营业总收入": 300.0, "利润总额": 40.0}),
        )];

        let (facts, stats) = normalizer.normalize("601398", &rows);
        assert_eq!(facts[0].net_profit, None);
        assert_eq!(facts[0].revenue, Some(300.0));
        assert_eq!(stats.ambiguous_fields, 1);
    }

    #[test]
    fn test_empty_input() {
        let (facts, stats) = FinancialNormalizer::default().normalize("601398", &[]);
        assert!(facts.is_empty());
        assert_eq!(stats, NormalizeStats::default());
    }
}
