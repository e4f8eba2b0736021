//! Repository Port - Simulation Output Persistence
//!
//! Defines traits for persisting simulation results using JSONL files.
//! No database dependency - lightweight append-only log format
//! for trade audit trails, plus a snapshot of the terminal market.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market_state::MarketState;
use crate::domain::pricing::PricingModel;
use crate::domain::time::PositionDuration;
use crate::domain::wallet::Wallet;

/// A single attempted trade, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
  /// Unique record identifier (uuid v4).
  pub id: String,
  /// Block the trade was submitted in.
  pub block_number: u64,
  /// Block timestamp in seconds.
  pub block_time: u64,
  /// Wallet address of the trading agent.
  pub agent: u64,
  /// Action name, e.g. `open_long`.
  pub action: String,
  /// Requested amount in the action's unit.
  pub trade_amount: Decimal,
  /// Mint time of the position being closed, if any.
  pub mint_time: Option<u64>,
  /// Whether the market accepted the trade.
  pub success: bool,
  /// Error text for rejected trades.
  pub error: Option<String>,
  /// Fixed APR after the trade (None when the market has no reserves).
  pub fixed_apr: Option<Decimal>,
}

/// Market snapshot written at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
  /// Version of the snapshot format.
  pub version: String,
  /// Wall-clock time the snapshot was taken (Unix ms).
  pub timestamp_ms: i64,
  pub block_number: u64,
  pub block_time: u64,
  pub pricing_model: PricingModel,
  pub position_duration: PositionDuration,
  pub market_state: MarketState,
  pub wallets: Vec<Wallet>,
}

/// Trait for simulation output sinks.
///
/// Uses JSONL (JSON Lines) format for append-only logging.
/// Each line is a self-contained JSON record, making it easy
/// to parse, stream, and recover from partial writes.
pub trait Repository: Send + Sync + 'static {
  /// Append a trade record to the trade log.
  fn save_trade(&self, record: &TradeRecord) -> anyhow::Result<()>;

  /// Load all trade records (for analysis).
  fn load_trades(&self) -> anyhow::Result<Vec<TradeRecord>>;

  /// Load trades submitted within a block range (inclusive).
  fn load_trades_range(
    &self,
    from_block: u64,
    to_block: u64,
  ) -> anyhow::Result<Vec<TradeRecord>>;

  /// Save a market snapshot.
  fn save_state(&self, snapshot: &MarketSnapshot) -> anyhow::Result<()>;

  /// Load the most recent market snapshot.
  fn load_latest_state(&self) -> anyhow::Result<Option<MarketSnapshot>>;

  /// Check if the repository is healthy (disk space, permissions).
  fn is_healthy(&self) -> bool;
}
