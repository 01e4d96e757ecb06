//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde_json::json;
use std::sync::Arc;

use zero_valuation::{
    DividendEvent, InMemoryStore, PipelineOptions, PriceBar, Repositories, RunMode,
    ShareCapitalEvent, StatementKind, StatementRow, Universe, ValuationPipeline,
};
use zero_valuation::valuation::FinancialNormalizer;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Monday-to-Friday calendar, both ends inclusive.
pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = start;
    while day <= end {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day += Duration::days(1);
    }
    days
}

pub fn bars(symbol: &str, days: &[NaiveDate], close: f64) -> Vec<PriceBar> {
    days.iter()
        .map(|&day| PriceBar {
            symbol: symbol.to_string(),
            trade_date: day,
            close_price: close,
            float_shares_hint: None,
        })
        .collect()
}

pub fn income(symbol: &str, report: NaiveDate, publish: NaiveDate, net_profit: f64) -> StatementRow {
    StatementRow {
        symbol: symbol.to_string(),
        kind: StatementKind::Income,
        report_date: report,
        publish_date: publish,
        items: json!({
            "归属于母公司所有者的净利润": net_profit,
            "营业总收入": net_profit * 10.0,
        })
        .as_object()
        .cloned()
        .unwrap(),
    }
}

pub fn balance(symbol: &str, report: NaiveDate, publish: NaiveDate, equity: f64) -> StatementRow {
    StatementRow {
        symbol: symbol.to_string(),
        kind: StatementKind::Balance,
        report_date: report,
        publish_date: publish,
        items: json!({ "归属于母公司股东权益合计": equity })
            .as_object()
            .cloned()
            .unwrap(),
    }
}

pub fn shares(symbol: &str, effective: NaiveDate, total: f64, float: Option<f64>) -> ShareCapitalEvent {
    ShareCapitalEvent {
        symbol: symbol.to_string(),
        effective_date: effective,
        total_shares: total,
        float_shares: float,
    }
}

pub fn dividend(symbol: &str, ex_date: NaiveDate, cash: f64) -> DividendEvent {
    DividendEvent {
        symbol: symbol.to_string(),
        ex_date,
        cash_dividend_per_share: cash,
    }
}

/// Trading days of the standard fixture.
pub fn standard_calendar() -> Vec<NaiveDate> {
    weekdays(d(2022, 1, 3), d(2023, 6, 30))
}

/// Cumulative net profit by report period with its publish date.
///
/// 2022: Q1=100, Q2=220, Q3=330, Q4=500; 2023: Q1=120.
pub fn standard_reports() -> Vec<(NaiveDate, NaiveDate, f64)> {
    vec![
        (d(2021, 3, 31), d(2021, 4, 28), 90.0),
        (d(2021, 12, 31), d(2022, 3, 25), 400.0),
        (d(2022, 3, 31), d(2022, 4, 28), 100.0),
        (d(2022, 6, 30), d(2022, 8, 25), 220.0),
        (d(2022, 9, 30), d(2022, 10, 28), 330.0),
        (d(2022, 12, 31), d(2023, 3, 30), 500.0),
        (d(2023, 3, 31), d(2023, 4, 27), 120.0),
    ]
}

/// Seed a symbol with 18 months of prices, statements, two share changes and two dividends.
pub async fn seed_standard(store: &InMemoryStore, symbol: &str) {
    store.add_price_bars(bars(symbol, &standard_calendar(), 10.0)).await;

    let mut rows = Vec::new();
    for (report, publish, profit) in standard_reports() {
        rows.push(income(symbol, report, publish, profit));
        rows.push(balance(symbol, report, publish, 5_000.0));
    }
    store.add_statement_rows(rows).await;

    store
        .add_share_events(vec![
            shares(symbol, d(2021, 12, 1), 1_000_000.0, Some(800_000.0)),
            shares(symbol, d(2022, 7, 15), 1_200_000.0, Some(900_000.0)),
        ])
        .await;

    store
        .add_dividend_events(vec![
            dividend(symbol, d(2022, 7, 8), 0.3),
            dividend(symbol, d(2023, 6, 15), 0.35),
        ])
        .await;
}

/// Options for a subset run with a fixed "today" and fast retries.
pub fn options(symbols: &[&str], mode: RunMode) -> PipelineOptions {
    PipelineOptions {
        mode,
        universe: Universe::Subset(symbols.iter().map(|s| s.to_string()).collect()),
        retry_backoff: std::time::Duration::from_millis(1),
        today: Some(d(2023, 6, 30)),
        ..Default::default()
    }
}

pub fn pipeline(repos: Repositories, options: PipelineOptions) -> ValuationPipeline {
    ValuationPipeline::new(repos, FinancialNormalizer::default(), options)
}

pub fn memory_pipeline(store: &Arc<InMemoryStore>, options: PipelineOptions) -> ValuationPipeline {
    pipeline(Repositories::from_store(store.clone()), options)
}
