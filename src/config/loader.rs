//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::SimulationConfig;
use crate::domain::actions::MarketActionType;
use crate::domain::time::SECONDS_PER_DAY;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<SimulationConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    name = %config.simulation.name,
    pricing_model = %config.market.pricing_model,
    liquidity = config.market.target_liquidity,
    target_apr = config.market.target_fixed_apr,
    trades = config.trades.len(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<SimulationConfig> {
  let config: SimulationConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Positive liquidity, rates and prices
/// - Fees in [0, 1)
/// - A position term that lands on the checkpoint grid
/// - Trades that name known actions and agents within the run
fn validate_config(config: &SimulationConfig) -> Result<()> {
  let run = &config.simulation;
  let market = &config.market;

  // Run validation
  anyhow::ensure!(!run.name.is_empty(), "Simulation name must not be empty");
  anyhow::ensure!(run.blocks_per_day > 0, "blocks_per_day must be positive");
  anyhow::ensure!(run.seconds_per_block > 0, "seconds_per_block must be positive");
  anyhow::ensure!(
    run.agent_budget >= 0.0 && run.agent_budget.is_finite(),
    "agent_budget must be a non-negative number, got {}",
    run.agent_budget
  );

  // Market validation
  anyhow::ensure!(
    market.target_liquidity > 0.0 && market.target_liquidity.is_finite(),
    "target_liquidity must be positive, got {}",
    market.target_liquidity
  );
  anyhow::ensure!(
    market.target_fixed_apr > 0.0 && market.target_fixed_apr < 1.0,
    "target_fixed_apr must be in (0, 1), got {}",
    market.target_fixed_apr
  );
  anyhow::ensure!(
    market.num_position_days > 0,
    "num_position_days must be positive"
  );
  anyhow::ensure!(
    market.checkpoint_duration_secs > 0
      && (market.num_position_days * SECONDS_PER_DAY) % market.checkpoint_duration_secs == 0,
    "position term of {} days must be a whole number of {} second checkpoints",
    market.num_position_days,
    market.checkpoint_duration_secs
  );
  for (name, fee) in [
    ("trade_fee_percent", market.trade_fee_percent),
    ("redemption_fee_percent", market.redemption_fee_percent),
  ] {
    anyhow::ensure!((0.0..1.0).contains(&fee), "{name} must be in [0, 1), got {fee}");
  }
  anyhow::ensure!(
    market.init_share_price > 0.0 && market.init_share_price.is_finite(),
    "init_share_price must be positive, got {}",
    market.init_share_price
  );
  anyhow::ensure!(
    market.variable_apr.is_finite() && market.variable_apr > -1.0,
    "variable_apr must be greater than -1, got {}",
    market.variable_apr
  );

  // Trade schedule validation
  let total_blocks = run.total_blocks();
  for (i, trade) in config.trades.iter().enumerate() {
    trade
      .action
      .parse::<MarketActionType>()
      .with_context(|| format!("Trade {i} has an invalid action"))?;
    anyhow::ensure!(
      trade.agent <= run.num_agents,
      "Trade {i} names agent {} but only agents 0..={} exist",
      trade.agent,
      run.num_agents
    );
    anyhow::ensure!(
      trade.block < total_blocks,
      "Trade {i} is scheduled at block {} past the last block {}",
      trade.block,
      total_blocks.saturating_sub(1)
    );
    anyhow::ensure!(
      trade.amount > 0.0 && trade.amount.is_finite(),
      "Trade {i} amount must be positive, got {}",
      trade.amount
    );
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::pricing::PricingModel;

  const MINIMAL: &str = r#"
[simulation]
name = "unit"
num_trading_days = 2
blocks_per_day = 4

[market]
target_liquidity = 1000000.0
target_fixed_apr = 0.05

[[trades]]
block = 1
agent = 1
action = "open_long"
amount = 1000.0
"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_defaults_fill_missing_fields() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.simulation.log_level, "info");
    assert_eq!(config.simulation.total_blocks(), 8);
    assert_eq!(config.market.pricing_model, PricingModel::Hyperdrive);
    assert_eq!(config.market.num_position_days, 365);
    assert_eq!(config.market.checkpoint_duration_secs, 86_400);
    assert_eq!(config.trades.len(), 1);
    assert_eq!(config.trades[0].mint_time, None);
  }

  #[test]
  fn test_rejects_unknown_action() {
    let content = MINIMAL.replace("open_long", "buy_the_dip");
    let err = parse_config(&content).unwrap_err();
    assert!(format!("{err:#}").contains("buy_the_dip"));
  }

  #[test]
  fn test_rejects_trade_after_last_block() {
    let content = MINIMAL.replace("block = 1", "block = 8");
    assert!(parse_config(&content).is_err());
  }

  #[test]
  fn test_rejects_off_grid_term() {
    let content = MINIMAL.replace(
      "target_fixed_apr = 0.05",
      "target_fixed_apr = 0.05\ncheckpoint_duration_secs = 7000",
    );
    assert!(parse_config(&content).is_err());
  }
}
