//! In-memory event store.
//!
//! Implements every repository trait over `RwLock`-guarded maps. Used as a
//! fixture in tests and by callers that already hold the events in memory.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::provider::{
    CheckpointRepository, DividendRepository, PriceRepository, ShareCapitalRepository,
    StatementRepository, StoreError, ValuationRepository,
};
use super::{DividendEvent, PriceBar, ShareCapitalEvent, StatementRow, ValuationRecord};

/// In-memory store keyed by symbol.
#[derive(Default)]
pub struct InMemoryStore {
    prices: RwLock<HashMap<String, BTreeMap<NaiveDate, PriceBar>>>,
    statements: RwLock<HashMap<String, Vec<StatementRow>>>,
    share_events: RwLock<HashMap<String, Vec<ShareCapitalEvent>>>,
    dividends: RwLock<HashMap<String, Vec<DividendEvent>>>,
    valuations: RwLock<HashMap<String, BTreeMap<NaiveDate, ValuationRecord>>>,
    checkpoints: RwLock<HashMap<String, NaiveDate>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite price bars by (symbol, trade_date).
    pub async fn add_price_bars(&self, bars: impl IntoIterator<Item = PriceBar>) {
        let mut prices = self.prices.write().await;
        for bar in bars {
            prices
                .entry(bar.symbol.clone())
                .or_default()
                .insert(bar.trade_date, bar);
        }
    }

    pub async fn add_statement_rows(&self, rows: impl IntoIterator<Item = StatementRow>) {
        let mut statements = self.statements.write().await;
        for row in rows {
            statements.entry(row.symbol.clone()).or_default().push(row);
        }
    }

    /// Share counts must already be in raw shares.
    pub async fn add_share_events(&self, events: impl IntoIterator<Item = ShareCapitalEvent>) {
        let mut share_events = self.share_events.write().await;
        for event in events {
            share_events.entry(event.symbol.clone()).or_default().push(event);
        }
    }

    pub async fn add_dividend_events(&self, events: impl IntoIterator<Item = DividendEvent>) {
        let mut dividends = self.dividends.write().await;
        for event in events {
            dividends.entry(event.symbol.clone()).or_default().push(event);
        }
    }

    /// Total number of stored valuation records across all symbols.
    pub async fn valuation_count(&self) -> usize {
        self.valuations.read().await.values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl PriceRepository for InMemoryStore {
    async fn symbols(&self) -> Result<Vec<String>, StoreError> {
        let prices = self.prices.read().await;
        let mut symbols: Vec<String> = prices
            .iter()
            .filter(|(_, bars)| !bars.is_empty())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        Ok(symbols)
    }

    async fn price_bars(
        &self,
        symbol: &str,
        after: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, StoreError> {
        let prices = self.prices.read().await;
        Ok(prices
            .get(symbol)
            .map(|bars| {
                bars.values()
                    .filter(|bar| after.map_or(true, |a| bar.trade_date > a))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl StatementRepository for InMemoryStore {
    async fn statement_rows(&self, symbol: &str) -> Result<Vec<StatementRow>, StoreError> {
        Ok(self
            .statements
            .read()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ShareCapitalRepository for InMemoryStore {
    async fn share_events(&self, symbol: &str) -> Result<Vec<ShareCapitalEvent>, StoreError> {
        let mut events = self
            .share_events
            .read()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_default();
        events.sort_by_key(|e| e.effective_date);
        Ok(events)
    }
}

#[async_trait]
impl DividendRepository for InMemoryStore {
    async fn dividend_events(&self, symbol: &str) -> Result<Vec<DividendEvent>, StoreError> {
        let mut events = self
            .dividends
            .read()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_default();
        events.sort_by_key(|e| e.ex_date);
        Ok(events)
    }
}

#[async_trait]
impl ValuationRepository for InMemoryStore {
    async fn upsert_valuations(&self, records: &[ValuationRecord]) -> Result<usize, StoreError> {
        let mut valuations = self.valuations.write().await;
        for record in records {
            valuations
                .entry(record.symbol.clone())
                .or_default()
                .insert(record.date, record.clone());
        }
        Ok(records.len())
    }

    async fn valuations(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<ValuationRecord>, StoreError> {
        let valuations = self.valuations.read().await;
        Ok(valuations
            .get(symbol)
            .map(|by_date| {
                by_date
                    .values()
                    .filter(|r| start.map_or(true, |s| r.date >= s))
                    .filter(|r| end.map_or(true, |e| r.date <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl CheckpointRepository for InMemoryStore {
    async fn checkpoint(&self, symbol: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.checkpoints.read().await.get(symbol).copied())
    }

    async fn save_checkpoint(&self, symbol: &str, last_date: NaiveDate) -> Result<(), StoreError> {
        self.checkpoints
            .write()
            .await
            .insert(symbol.to_string(), last_date);
        Ok(())
    }

    async fn clear_checkpoint(&self, symbol: &str) -> Result<(), StoreError> {
        self.checkpoints.write().await.remove(symbol);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(symbol: &str, day: NaiveDate) -> PriceBar {
        PriceBar {
            symbol: symbol.into(),
            trade_date: day,
            close_price: 10.0,
            float_shares_hint: None,
        }
    }

    #[tokio::test]
    async fn test_price_bars_sorted_and_filtered() {
        let store = InMemoryStore::new();
        store
            .add_price_bars(vec![
                bar("000001", date(2024, 1, 3)),
                bar("000001", date(2024, 1, 2)),
                bar("000001", date(2024, 1, 4)),
            ])
            .await;

        let bars = store.price_bars("000001", None).await.unwrap();
        let days: Vec<_> = bars.iter().map(|b| b.trade_date).collect();
        assert_eq!(days, vec![date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)]);

        let tail = store.price_bars("000001", Some(date(2024, 1, 3))).await.unwrap();
        assert_eq!(tail.len(), 1);

        assert!(store.price_bars("600000", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_roundtrip() {
        let store = InMemoryStore::new();
        assert_eq!(store.checkpoint("000001").await.unwrap(), None);

        store.save_checkpoint("000001", date(2024, 1, 4)).await.unwrap();
        assert_eq!(store.checkpoint("000001").await.unwrap(), Some(date(2024, 1, 4)));

        store.clear_checkpoint("000001").await.unwrap();
        assert_eq!(store.checkpoint("000001").await.unwrap(), None);
    }
}
