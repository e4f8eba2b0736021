//! Configuration Module - TOML-based Simulation Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Pool parameters, agent budgets and the scripted trade schedule are
//! externalized here - nothing is hardcoded in the domain layer.

pub mod loader;

use serde::Deserialize;

use crate::domain::pricing::PricingModel;

/// Top-level simulation configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the simulation begins.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
  /// Run identity, clock and output settings.
  pub simulation: RunConfig,
  /// Pool parameters.
  pub market: MarketConfig,
  /// Scripted trades, replayed in block order.
  #[serde(default)]
  pub trades: Vec<TradeConfig>,
}

/// Run identity and clock configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
  /// Human-readable run name; also names the trade log file.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Number of simulated days.
  #[serde(default = "default_num_trading_days")]
  pub num_trading_days: u64,
  /// Blocks minted per simulated day.
  #[serde(default = "default_blocks_per_day")]
  pub blocks_per_day: u64,
  /// Seconds between blocks.
  #[serde(default = "default_seconds_per_block")]
  pub seconds_per_block: u64,
  /// Number of trading agents besides the initial LP (agent 0).
  #[serde(default = "default_num_agents")]
  pub num_agents: usize,
  /// Base budget of each trading agent.
  #[serde(default = "default_agent_budget")]
  pub agent_budget: f64,
  /// Directory for trade logs and the market snapshot.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

/// Pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
  /// Curve variant.
  #[serde(default)]
  pub pricing_model: PricingModel,
  /// Base contributed by the initial LP.
  pub target_liquidity: f64,
  /// Fixed rate the pool is initialized at.
  pub target_fixed_apr: f64,
  /// Position term in days.
  #[serde(default = "default_num_position_days")]
  pub num_position_days: u64,
  /// Checkpoint spacing in seconds.
  #[serde(default = "default_checkpoint_duration_secs")]
  pub checkpoint_duration_secs: u64,
  /// Curve fee, as a fraction of implied interest.
  #[serde(default = "default_fee_percent")]
  pub trade_fee_percent: f64,
  /// Flat fee on matured bonds.
  #[serde(default = "default_fee_percent")]
  pub redemption_fee_percent: f64,
  /// Share price when the pool opens.
  #[serde(default = "default_share_price")]
  pub init_share_price: f64,
  /// Variable rate the share price accrues at.
  #[serde(default)]
  pub variable_apr: f64,
}

/// One scripted trade.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeConfig {
  /// Block index (from 0) the trade is submitted in.
  pub block: u64,
  /// Agent index; 0 is the initial LP.
  pub agent: usize,
  /// Action name, e.g. `open_long`.
  pub action: String,
  /// Trade amount in the action's unit.
  pub amount: f64,
  /// Mint time of the position to close. Defaults to the agent's oldest.
  pub mint_time: Option<u64>,
}

impl RunConfig {
  pub fn total_blocks(&self) -> u64 {
    self.num_trading_days * self.blocks_per_day
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_num_trading_days() -> u64 {
  10
}

fn default_blocks_per_day() -> u64 {
  7200
}

fn default_seconds_per_block() -> u64 {
  12
}

fn default_num_agents() -> usize {
  3
}

fn default_agent_budget() -> f64 {
  10_000_000.0
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_num_position_days() -> u64 {
  365
}

fn default_checkpoint_duration_secs() -> u64 {
  86_400
}

fn default_fee_percent() -> f64 {
  0.05
}

fn default_share_price() -> f64 {
  1.0
}
