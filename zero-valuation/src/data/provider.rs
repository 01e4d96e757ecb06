//! Repository abstractions for the valuation event store.
//!
//! One trait per event stream, plus the output sink and checkpoint store.
//! The pipeline only sees these traits, so the SQLite store and the
//! in-memory store are interchangeable.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

use super::{DividendEvent, PriceBar, ShareCapitalEvent, StatementRow, ValuationRecord};

// ============================================================================
// Store Error
// ============================================================================

/// Errors raised by a repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store is temporarily unavailable (busy, locked, connection lost)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored row cannot be decoded
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Check if the error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

// ============================================================================
// Input Streams
// ============================================================================

/// Daily price history reader.
#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// All symbols that have at least one price bar, sorted.
    async fn symbols(&self) -> Result<Vec<String>, StoreError>;

    /// Price bars ordered by trade date.
    ///
    /// # Arguments
    /// * `symbol` - Stock symbol (e.g., "600519")
    /// * `after` - Only bars strictly after this date
    async fn price_bars(
        &self,
        symbol: &str,
        after: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, StoreError>;
}

/// Raw financial statement reader (income statement and balance sheet rows).
#[async_trait]
pub trait StatementRepository: Send + Sync {
    async fn statement_rows(&self, symbol: &str) -> Result<Vec<StatementRow>, StoreError>;
}

/// Share capital change reader. Counts are returned in raw shares.
#[async_trait]
pub trait ShareCapitalRepository: Send + Sync {
    async fn share_events(&self, symbol: &str) -> Result<Vec<ShareCapitalEvent>, StoreError>;
}

/// Ex-dividend event reader.
#[async_trait]
pub trait DividendRepository: Send + Sync {
    async fn dividend_events(&self, symbol: &str) -> Result<Vec<DividendEvent>, StoreError>;
}

// ============================================================================
// Output
// ============================================================================

/// Valuation sink keyed by (symbol, date), plus the range query for consumers.
#[async_trait]
pub trait ValuationRepository: Send + Sync {
    /// Insert or overwrite a batch of records. Returns the number written.
    async fn upsert_valuations(&self, records: &[ValuationRecord]) -> Result<usize, StoreError>;

    /// Records for a symbol ordered by date, both bounds inclusive.
    async fn valuations(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<ValuationRecord>, StoreError>;
}

/// Last computed trading day per symbol.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn checkpoint(&self, symbol: &str) -> Result<Option<NaiveDate>, StoreError>;

    async fn save_checkpoint(&self, symbol: &str, last_date: NaiveDate) -> Result<(), StoreError>;

    async fn clear_checkpoint(&self, symbol: &str) -> Result<(), StoreError>;
}

// ============================================================================
// Repository Bundle
// ============================================================================

/// The set of repositories the pipeline is wired with.
#[derive(Clone)]
pub struct Repositories {
    pub prices: Arc<dyn PriceRepository>,
    pub statements: Arc<dyn StatementRepository>,
    pub share_capital: Arc<dyn ShareCapitalRepository>,
    pub dividends: Arc<dyn DividendRepository>,
    pub valuations: Arc<dyn ValuationRepository>,
    pub checkpoints: Arc<dyn CheckpointRepository>,
}

impl Repositories {
    /// Wire every repository to a single store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PriceRepository
            + StatementRepository
            + ShareCapitalRepository
            + DividendRepository
            + ValuationRepository
            + CheckpointRepository
            + 'static,
    {
        Self {
            prices: store.clone(),
            statements: store.clone(),
            share_capital: store.clone(),
            dividends: store.clone(),
            valuations: store.clone(),
            checkpoints: store,
        }
    }

    /// Replace the valuation sink (e.g. with an instrumented wrapper).
    pub fn with_valuation_sink(mut self, sink: Arc<dyn ValuationRepository>) -> Self {
        self.valuations = sink;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
