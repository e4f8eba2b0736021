//! Repository Implementation — File-backed Simulation Sink
//!
//! One data directory per deployment: trade logs under `trades/`, one
//! file per run name, and the terminal market snapshot beside them.

use std::path::Path;

use anyhow::Result;

use super::state::StateStore;
use super::trades::TradeLogger;
use crate::ports::repository::{MarketSnapshot, Repository, TradeRecord};

/// File-backed repository combining snapshot and trade persistence.
pub struct RepositoryImpl {
    state_store: StateStore,
    trade_logger: TradeLogger,
}

impl RepositoryImpl {
    pub fn new(state_store: StateStore, trade_logger: TradeLogger) -> Self {
        Self {
            state_store,
            trade_logger,
        }
    }

    /// Create a repository rooted at `data_dir`, creating subdirectories as needed.
    pub fn from_data_dir(data_dir: impl AsRef<Path>, run_name: &str) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let state_store = StateStore::new(data_dir)?;
        let trade_logger = TradeLogger::new(data_dir, run_name)?;
        Ok(Self::new(state_store, trade_logger))
    }
}

impl Repository for RepositoryImpl {
    fn save_trade(&self, record: &TradeRecord) -> Result<()> {
        self.trade_logger.append_trade(record)
    }

    fn load_trades(&self) -> Result<Vec<TradeRecord>> {
        self.trade_logger.load_all_trades()
    }

    fn load_trades_range(&self, from_block: u64, to_block: u64) -> Result<Vec<TradeRecord>> {
        self.trade_logger.load_trades_range(from_block, to_block)
    }

    fn save_state(&self, snapshot: &MarketSnapshot) -> Result<()> {
        self.state_store.save(snapshot)
    }

    fn load_latest_state(&self) -> Result<Option<MarketSnapshot>> {
        self.state_store.load()
    }

    fn is_healthy(&self) -> bool {
        self.state_store.is_healthy() && self.trade_logger.is_healthy()
    }
}
