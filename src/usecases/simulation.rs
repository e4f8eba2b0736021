//! Simulation Use Case - Block-stepping Trade Replay
//!
//! Drives a market through simulated time:
//! 1. Advance the clock one block and accrue variable interest
//! 2. Record the block's checkpoint (maturing due positions)
//! 3. Execute the trades scheduled for the block, in order
//!
//! Rejected trades are recorded and skipped; they never stop the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::market::Market;
use crate::config::SimulationConfig;
use crate::domain::actions::{MarketAction, MarketActionType};
use crate::domain::errors::MarketError;
use crate::domain::market_state::MarketState;
use crate::domain::time::{BlockTime, PositionDuration};
use crate::domain::wallet::Wallet;
use crate::ports::repository::{MarketSnapshot, Repository, TradeRecord};

/// A trade to submit at a given block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrade {
  pub block: u64,
  pub agent: usize,
  pub action: MarketAction,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
  pub name: String,
  pub blocks: u64,
  pub final_block_time: u64,
  pub trades_succeeded: usize,
  pub trades_failed: usize,
  pub fixed_apr: Option<Decimal>,
  pub spot_price: Option<Decimal>,
  pub share_price: Decimal,
}

/// Block-stepping driver around one market and its agents.
pub struct Simulation<R: Repository> {
  name: String,
  market: Market,
  clock: Arc<BlockTime>,
  wallets: Vec<Wallet>,
  schedule: Vec<ScheduledTrade>,
  total_blocks: u64,
  repo: R,
  trades_succeeded: usize,
  trades_failed: usize,
}

fn to_decimal(value: f64, what: &str) -> Result<Decimal> {
  Decimal::from_f64(value).with_context(|| format!("{what} is not representable: {value}"))
}

impl<R: Repository> Simulation<R> {
  /// Build a simulation over an already constructed market.
  ///
  /// The schedule is replayed in block order; trades sharing a block keep
  /// their given order.
  pub fn new(
    name: impl Into<String>,
    market: Market,
    clock: Arc<BlockTime>,
    wallets: Vec<Wallet>,
    mut schedule: Vec<ScheduledTrade>,
    total_blocks: u64,
    repo: R,
  ) -> Result<Self> {
    if let Some(trade) = schedule.iter().find(|t| t.agent >= wallets.len()) {
      anyhow::bail!(
        "Scheduled trade at block {} names agent {} but only {} wallets exist",
        trade.block,
        trade.agent,
        wallets.len()
      );
    }
    schedule.sort_by_key(|t| t.block);
    Ok(Self {
      name: name.into(),
      market,
      clock,
      wallets,
      schedule,
      total_blocks,
      repo,
      trades_succeeded: 0,
      trades_failed: 0,
    })
  }

  /// Build and initialize a simulation from configuration.
  ///
  /// Agent 0 seeds the pool with the target liquidity; agents
  /// `1..=num_agents` start with the configured budget.
  pub fn from_config(config: &SimulationConfig, repo: R) -> Result<Self> {
    let run = &config.simulation;
    let market_config = &config.market;

    let target_apr = to_decimal(market_config.target_fixed_apr, "target_fixed_apr")?;
    let liquidity = to_decimal(market_config.target_liquidity, "target_liquidity")?;
    let init_share_price = to_decimal(market_config.init_share_price, "init_share_price")?;
    let position_duration =
      PositionDuration::from_target_apr(Decimal::from(market_config.num_position_days), target_apr)?;
    let state = MarketState {
      share_price: init_share_price,
      init_share_price,
      variable_apr: to_decimal(market_config.variable_apr, "variable_apr")?,
      trade_fee_percent: to_decimal(market_config.trade_fee_percent, "trade_fee_percent")?,
      redemption_fee_percent: to_decimal(
        market_config.redemption_fee_percent,
        "redemption_fee_percent",
      )?,
      checkpoint_duration: market_config.checkpoint_duration_secs,
      ..MarketState::default()
    };

    let clock = Arc::new(BlockTime::new(0, run.seconds_per_block));
    let mut market = Market::new(market_config.pricing_model, state, position_duration, clock.clone())?;

    let agent_budget = to_decimal(run.agent_budget, "agent_budget")?;
    let mut wallets = vec![Wallet::new(0, liquidity)];
    wallets.extend((1..=run.num_agents).map(|address| Wallet::new(address as u64, agent_budget)));
    market
      .initialize(&mut wallets[0], liquidity, target_apr)
      .context("Failed to initialize market")?;

    let schedule = config
      .trades
      .iter()
      .map(|trade| -> Result<ScheduledTrade> {
        let action_type: MarketActionType = trade.action.parse()?;
        let action = MarketAction {
          mint_time: trade.mint_time,
          ..MarketAction::new(action_type, to_decimal(trade.amount, "trade amount")?)
        };
        Ok(ScheduledTrade {
          block: trade.block,
          agent: trade.agent,
          action,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Self::new(&run.name, market, clock, wallets, schedule, run.total_blocks(), repo)
  }

  pub fn market(&self) -> &Market {
    &self.market
  }

  pub fn wallets(&self) -> &[Wallet] {
    &self.wallets
  }

  /// Run every block, then persist the terminal snapshot.
  #[instrument(skip(self), fields(name = %self.name, blocks = self.total_blocks))]
  pub fn run(&mut self) -> Result<SimulationReport> {
    info!(trades = self.schedule.len(), "Simulation started");

    for block in 0..self.total_blocks {
      if block > 0 {
        self.clock.step();
        self
          .market
          .accrue_interest(self.clock.seconds_per_block())
          .context("Failed to accrue interest")?;
      }
      self.run_block(block)?;
    }

    self
      .repo
      .save_state(&self.snapshot())
      .context("Failed to save market snapshot")?;

    let report = self.report();
    info!(
      succeeded = report.trades_succeeded,
      failed = report.trades_failed,
      fixed_apr = ?report.fixed_apr,
      share_price = %report.share_price,
      "Simulation finished"
    );
    Ok(report)
  }

  fn run_block(&mut self, block: u64) -> Result<()> {
    let checkpoint_time = self.market.latest_checkpoint_time();
    self
      .market
      .checkpoint(checkpoint_time)
      .with_context(|| format!("Failed to checkpoint block {block}"))?;

    let start = self.schedule.partition_point(|t| t.block < block);
    let end = self.schedule.partition_point(|t| t.block <= block);
    for index in start..end {
      let trade = self.schedule[index].clone();
      let record = self.execute_trade(block, &trade);
      self.repo.save_trade(&record).context("Failed to save trade record")?;
    }
    Ok(())
  }

  fn execute_trade(&mut self, block: u64, trade: &ScheduledTrade) -> TradeRecord {
    let wallet = &mut self.wallets[trade.agent];
    let mut action = trade.action.clone();
    if action.mint_time.is_none() {
      action.mint_time = oldest_position(wallet, action.action_type);
    }

    let result = self.market.perform_action(&action, wallet);
    match &result {
      Ok(_) => {
        self.trades_succeeded += 1;
        debug!(block, agent = trade.agent, action = %action.action_type, "Scheduled trade executed");
      }
      Err(e) => {
        self.trades_failed += 1;
        warn!(block, agent = trade.agent, action = %action.action_type, error = %e, "Scheduled trade rejected");
      }
    }

    TradeRecord {
      id: Uuid::new_v4().to_string(),
      block_number: block,
      block_time: self.market.block_time(),
      agent: trade.agent as u64,
      action: action.action_type.to_string(),
      trade_amount: action.trade_amount,
      mint_time: action.mint_time,
      success: result.is_ok(),
      error: result.err().map(|e: MarketError| e.to_string()),
      fixed_apr: self.market.fixed_apr(),
    }
  }

  pub fn snapshot(&self) -> MarketSnapshot {
    MarketSnapshot {
      version: env!("CARGO_PKG_VERSION").to_string(),
      timestamp_ms: Utc::now().timestamp_millis(),
      block_number: self.clock.block_number(),
      block_time: self.clock.time(),
      pricing_model: self.market.pricing_model(),
      position_duration: *self.market.position_duration(),
      market_state: self.market.market_state().clone(),
      wallets: self.wallets.clone(),
    }
  }

  pub fn report(&self) -> SimulationReport {
    SimulationReport {
      name: self.name.clone(),
      blocks: self.total_blocks,
      final_block_time: self.clock.time(),
      trades_succeeded: self.trades_succeeded,
      trades_failed: self.trades_failed,
      fixed_apr: self.market.fixed_apr(),
      spot_price: self.market.spot_price(),
      share_price: self.market.market_state().share_price,
    }
  }
}

/// Mint time of the wallet's oldest position a close action would target.
fn oldest_position(wallet: &Wallet, action_type: MarketActionType) -> Option<u64> {
  match action_type {
    MarketActionType::CloseLong => wallet.longs.keys().next().copied(),
    MarketActionType::CloseShort => wallet.shorts.keys().next().copied(),
    _ => None,
  }
}
