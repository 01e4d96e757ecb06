//! Zero Valuation Library
//!
//! Point-in-time daily fundamental valuation for A-shares. Given each
//! stock's daily prices, quarterly statements (with separate report and
//! publish dates), share capital changes and dividends, it produces a daily
//! series of market value, P/E, P/B, P/S, ROE, EPS, BPS and dividend yield
//! that never uses information published after the day being valued.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        zero-valuation                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  data (repositories)  →  valuation (pure core)  →  data (upsert)    │
//! │                                                                     │
//! │  normalizer → rollup ─┐                                             │
//! │  dividend ────────────┼→ fusion (as-of joins) → metrics             │
//! │  share capital ───────┘                                             │
//! │                                                                     │
//! │  checkpoint: incremental per-symbol progress                        │
//! │  pipeline: universe, parallelism, batched upsert with retry         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Point in time
//! - Financial figures are joined on their **publish date**, never their
//!   report date
//! - Every record carries `publish_date_basis` so consumers can verify it
//!
//! ## TTM
//! - Q4 cumulative figures are the full year
//! - Q1-Q3: current - same period last year + last full year

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod checkpoint;
pub mod data;
pub mod pipeline;
pub mod valuation;

pub use checkpoint::{CheckpointManager, CheckpointState, RunMode};
pub use data::{
    DividendEvent, FinancialFact, InMemoryStore, LocalStorage, LocalStorageConfig, PriceBar,
    Repositories, ShareCapitalEvent, ShareUnit, StatementKind, StatementRow, StoreError,
    ValuationRecord,
};
pub use pipeline::{
    PipelineOptions, RunReport, SymbolError, SymbolOutcome, SymbolSummary, Universe,
    ValuationPipeline,
};
