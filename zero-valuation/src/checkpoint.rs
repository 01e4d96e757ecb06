//! Incremental checkpoint manager.
//!
//! Per symbol: `NeverComputed → Partial(last_date) → Partial(last_date') ...`.
//! A full rebuild resets the symbol to `NeverComputed` before it is recomputed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::data::{CheckpointRepository, StoreError};

// ============================================================================
// Run Mode
// ============================================================================

/// Whether a run continues from checkpoints or recomputes everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Incremental,
    FullRebuild,
}

impl RunMode {
    pub fn from_full_rebuild(full_rebuild: bool) -> Self {
        if full_rebuild {
            Self::FullRebuild
        } else {
            Self::Incremental
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incremental => write!(f, "incremental"),
            Self::FullRebuild => write!(f, "full_rebuild"),
        }
    }
}

// ============================================================================
// Checkpoint State
// ============================================================================

/// Checkpoint state of one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    NeverComputed,
    /// Every trading day up to and including this date has been written
    Partial(NaiveDate),
}

impl CheckpointState {
    /// Only price bars strictly after this date need valuing.
    pub fn resume_after(&self) -> Option<NaiveDate> {
        match self {
            Self::NeverComputed => None,
            Self::Partial(last) => Some(*last),
        }
    }
}

impl From<Option<NaiveDate>> for CheckpointState {
    fn from(last: Option<NaiveDate>) -> Self {
        last.map_or(Self::NeverComputed, Self::Partial)
    }
}

impl std::fmt::Display for CheckpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeverComputed => write!(f, "never_computed"),
            Self::Partial(last) => write!(f, "partial({})", last),
        }
    }
}

// ============================================================================
// Checkpoint Manager
// ============================================================================

/// Reads, resets and advances per-symbol checkpoints.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointRepository>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointRepository>) -> Self {
        Self { store }
    }

    /// Decide where a symbol resumes. A full rebuild clears the stored checkpoint.
    pub async fn plan(&self, symbol: &str, mode: RunMode) -> Result<CheckpointState, StoreError> {
        if mode == RunMode::FullRebuild {
            self.store.clear_checkpoint(symbol).await?;
            debug!(symbol, "Checkpoint reset for full rebuild");
            return Ok(CheckpointState::NeverComputed);
        }

        let state = CheckpointState::from(self.store.checkpoint(symbol).await?);
        debug!(symbol, %state, "Checkpoint loaded");
        Ok(state)
    }

    /// Record that every day up to `last_date` has been written.
    ///
    /// Never moves a checkpoint backwards.
    pub async fn advance(
        &self,
        symbol: &str,
        previous: CheckpointState,
        last_date: NaiveDate,
    ) -> Result<CheckpointState, StoreError> {
        if let CheckpointState::Partial(prev) = previous {
            if last_date <= prev {
                return Ok(previous);
            }
        }

        self.store.save_checkpoint(symbol, last_date).await?;
        Ok(CheckpointState::Partial(last_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryStore;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_run_mode_from_flag() {
        assert_eq!(RunMode::from_full_rebuild(true), RunMode::FullRebuild);
        assert_eq!(RunMode::from_full_rebuild(false), RunMode::Incremental);
        assert_eq!(RunMode::default().to_string(), "incremental");
    }

    #[test]
    fn test_state_resume_after() {
        assert_eq!(CheckpointState::NeverComputed.resume_after(), None);
        assert_eq!(CheckpointState::Partial(date(3)).resume_after(), Some(date(3)));
        assert_eq!(CheckpointState::from(Some(date(4))), CheckpointState::Partial(date(4)));
    }

    #[tokio::test]
    async fn test_plan_and_advance() {
        let store = Arc::new(InMemoryStore::new());
        let manager = CheckpointManager::new(store.clone());

        let state = manager.plan("600000", RunMode::Incremental).await.unwrap();
        assert_eq!(state, CheckpointState::NeverComputed);

        let state = manager.advance("600000", state, date(5)).await.unwrap();
        assert_eq!(state, CheckpointState::Partial(date(5)));
        assert_eq!(
            manager.plan("600000", RunMode::Incremental).await.unwrap(),
            CheckpointState::Partial(date(5))
        );
    }

    #[tokio::test]
    async fn test_advance_never_moves_back() {
        let store = Arc::new(InMemoryStore::new());
        let manager = CheckpointManager::new(store.clone());

        let state = manager.advance("600000", CheckpointState::NeverComputed, date(10)).await.unwrap();
        let state = manager.advance("600000", state, date(7)).await.unwrap();

        assert_eq!(state, CheckpointState::Partial(date(10)));
        assert_eq!(store.checkpoint("600000").await.unwrap(), Some(date(10)));
    }

    #[tokio::test]
    async fn test_full_rebuild_resets() {
        let store = Arc::new(InMemoryStore::new());
        store.save_checkpoint("600000", date(10)).await.unwrap();
        let manager = CheckpointManager::new(store.clone());

        let state = manager.plan("600000", RunMode::FullRebuild).await.unwrap();

        assert_eq!(state, CheckpointState::NeverComputed);
        assert_eq!(store.checkpoint("600000").await.unwrap(), None);
    }
}
