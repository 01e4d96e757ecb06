//! TTM / LF roll-up.
//!
//! A-share statements report year-to-date cumulative figures, so the
//! trailing twelve months for a Q1-Q3 period is
//! `current - same period last year + last full year`, and a Q4 figure is
//! already the full year. The result is re-indexed by disclosure date so the
//! fusion step can look it up as of any trading day.
//!
//! Income figures (TTM, LF) and balance figures (adjusted equity) advance
//! independently, each on its own statement's disclosure date. Neither side
//! ever moves back to an older period: a late restatement of a period older
//! than the one already known is ignored.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::data::FinancialFact;

/// One disclosure-date point of the roll-up series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupRow {
    /// Latest period any figure in this row belongs to
    pub report_date: NaiveDate,
    /// Date the row's latest figure became public; the PIT join key
    pub publish_date: NaiveDate,
    pub net_profit_ttm: Option<f64>,
    pub revenue_ttm: Option<f64>,
    /// Net profit of the latest disclosed full fiscal year
    pub net_profit_lf: Option<f64>,
    pub adjusted_equity: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum Figures {
    Income {
        net_profit_ttm: Option<f64>,
        revenue_ttm: Option<f64>,
        annual_net_profit: Option<f64>,
    },
    Balance {
        adjusted_equity: Option<f64>,
    },
}

/// One side of one fact becoming public.
#[derive(Debug, Clone, Copy)]
struct Disclosure<'a> {
    fact: &'a FinancialFact,
    publish_date: NaiveDate,
    figures: Figures,
}

/// Running point-in-time view while walking disclosures in date order.
#[derive(Debug, Default)]
struct Known {
    income_period: Option<NaiveDate>,
    net_profit_ttm: Option<f64>,
    revenue_ttm: Option<f64>,
    lf_period: Option<NaiveDate>,
    net_profit_lf: Option<f64>,
    balance_period: Option<NaiveDate>,
    adjusted_equity: Option<f64>,
}

impl Known {
    /// Apply a disclosure. Returns false when it changes nothing because every
    /// figure it carries belongs to an older period than the one already known.
    fn apply(&mut self, period: NaiveDate, figures: Figures) -> bool {
        match figures {
            Figures::Income {
                net_profit_ttm,
                revenue_ttm,
                annual_net_profit,
            } => {
                let newer = |known: Option<NaiveDate>| known.map_or(true, |known| period >= known);

                // An annual report published after the next Q1 still moves LF
                let lf = annual_net_profit.filter(|_| newer(self.lf_period));
                let ttm = newer(self.income_period);
                if lf.is_none() && !ttm {
                    return false;
                }
                if lf.is_some() {
                    self.lf_period = Some(period);
                    self.net_profit_lf = lf;
                }
                if ttm {
                    self.income_period = Some(period);
                    self.net_profit_ttm = net_profit_ttm;
                    self.revenue_ttm = revenue_ttm;
                }
            }
            Figures::Balance { adjusted_equity } => {
                if self.balance_period.is_some_and(|known| period < known) {
                    return false;
                }
                self.balance_period = Some(period);
                self.adjusted_equity = adjusted_equity;
            }
        }
        true
    }

    fn row(&self, fallback_period: NaiveDate, publish_date: NaiveDate) -> RollupRow {
        RollupRow {
            report_date: self
                .income_period
                .max(self.balance_period)
                .unwrap_or(fallback_period),
            publish_date,
            net_profit_ttm: self.net_profit_ttm,
            revenue_ttm: self.revenue_ttm,
            net_profit_lf: self.net_profit_lf,
            adjusted_equity: self.adjusted_equity,
        }
    }
}

/// Build the roll-up series from normalized facts.
///
/// `facts` must hold at most one fact per report date (see the normalizer).
/// The output is sorted by publish date with one row per publish date; when
/// several periods disclose on the same day the later period wins.
pub fn rollup(facts: &[FinancialFact]) -> Vec<RollupRow> {
    let by_period: HashMap<NaiveDate, &FinancialFact> =
        facts.iter().map(|f| (f.report_date, f)).collect();

    let mut disclosures: Vec<Disclosure<'_>> = Vec::with_capacity(facts.len() * 2);
    for fact in facts {
        if let Some(publish_date) = fact.income_publish_date {
            disclosures.push(Disclosure {
                fact,
                publish_date,
                figures: Figures::Income {
                    net_profit_ttm: trailing_twelve_months(fact, &by_period, |f| f.net_profit),
                    revenue_ttm: trailing_twelve_months(fact, &by_period, |f| f.revenue),
                    annual_net_profit: fact
                        .net_profit
                        .filter(|_| fact.report_date.month() == 12),
                },
            });
        }
        if let Some(publish_date) = fact.balance_publish_date {
            disclosures.push(Disclosure {
                fact,
                publish_date,
                figures: Figures::Balance {
                    adjusted_equity: fact.adjusted_equity,
                },
            });
        }
    }

    disclosures.sort_by_key(|d| (d.publish_date, d.fact.report_date));

    let mut known = Known::default();
    let mut rows: Vec<RollupRow> = Vec::with_capacity(disclosures.len());
    for disclosure in disclosures {
        let period = disclosure.fact.report_date;
        if !known.apply(period, disclosure.figures) {
            debug!(
                symbol = %disclosure.fact.symbol,
                report_date = %period,
                publish_date = %disclosure.publish_date,
                "Ignoring late disclosure of an older period"
            );
            continue;
        }

        let row = known.row(period, disclosure.publish_date);
        // Same-day disclosures collapse into one row
        match rows.last_mut() {
            Some(last) if last.publish_date == row.publish_date => *last = row,
            _ => rows.push(row),
        }
    }

    rows
}

/// TTM of one income field for one period, or `None` when any input is unknown.
///
/// Prior-year inputs only count if their income statement was public by the
/// time the current one was published.
fn trailing_twelve_months<F>(
    fact: &FinancialFact,
    by_period: &HashMap<NaiveDate, &FinancialFact>,
    field: F,
) -> Option<f64>
where
    F: Fn(&FinancialFact) -> Option<f64>,
{
    let current = field(fact)?;
    let published = fact.income_publish_date?;
    let period = fact.report_date;

    match period.month() {
        12 => Some(current),
        3 | 6 | 9 => {
            let prior_year = period.year() - 1;
            let same_period = NaiveDate::from_ymd_opt(prior_year, period.month(), period.day())?;
            let prior_annual = NaiveDate::from_ymd_opt(prior_year, 12, 31)?;

            let lookup = |date: NaiveDate| {
                by_period
                    .get(&date)
                    .filter(|f| f.income_publish_date.is_some_and(|p| p <= published))
                    .and_then(|f| field(f))
            };

            Some(current - lookup(same_period)? + lookup(prior_annual)?)
        }
        _ => None,
    }
}
