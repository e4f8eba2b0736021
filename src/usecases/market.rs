//! Market Use Case - Trade Orchestration
//!
//! Owns the market state, pricing model and position duration, and is the
//! only path through which trades reach the ledger.
//!
//! Trade flow:
//! 1. Validate the request's shape
//! 2. Record the checkpoint for the current block (maturing due positions)
//! 3. Price the trade with the action calculator
//! 4. Apply the market delta (invariants checked), then the wallet delta
//!
//! A failure at any step leaves the market as it was after step 2 and the
//! wallet untouched.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::domain::actions::{
  self, ActionContext, MarketAction, MarketActionType, TradeDeltas,
};
use crate::domain::errors::MarketError;
use crate::domain::market_state::{MarketDeltas, MarketState};
use crate::domain::pricing::PricingModel;
use crate::domain::time::{PositionDuration, SECONDS_PER_YEAR};
use crate::domain::wallet::WalletDeltas;
use crate::ports::clock::TimeProvider;
use crate::ports::wallet::WalletLedger;

/// A single fixed-rate pool.
pub struct Market {
  pricing_model: PricingModel,
  market_state: MarketState,
  position_duration: PositionDuration,
  clock: Arc<dyn TimeProvider>,
}

impl std::fmt::Debug for Market {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Market")
      .field("pricing_model", &self.pricing_model)
      .field("position_duration", &self.position_duration)
      .field("block_time", &self.block_time())
      .field("market_state", &self.market_state)
      .finish()
  }
}

impl Market {
  /// Create a market over `market_state`.
  ///
  /// The position duration must be a whole number of checkpoints so that
  /// every maturity lands on a checkpoint boundary.
  pub fn new(
    pricing_model: PricingModel,
    market_state: MarketState,
    position_duration: PositionDuration,
    clock: Arc<dyn TimeProvider>,
  ) -> Result<Self, MarketError> {
    let checkpoint_duration = market_state.checkpoint_duration;
    if checkpoint_duration == 0 || position_duration.seconds() % checkpoint_duration != 0 {
      return Err(MarketError::InvalidPositionDuration(format!(
        "{} seconds is not a multiple of the {checkpoint_duration} second checkpoint duration",
        position_duration.seconds()
      )));
    }
    market_state.check_invariants()?;

    info!(
      pricing_model = %pricing_model,
      position_days = %position_duration.days(),
      time_stretch = %position_duration.time_stretch(),
      checkpoint_duration,
      "Market created"
    );

    Ok(Self {
      pricing_model,
      market_state,
      position_duration,
      clock,
    })
  }

  pub fn market_state(&self) -> &MarketState {
    &self.market_state
  }

  pub fn pricing_model(&self) -> PricingModel {
    self.pricing_model
  }

  pub fn position_duration(&self) -> &PositionDuration {
    &self.position_duration
  }

  pub fn block_time(&self) -> u64 {
    self.clock.current_block_time()
  }

  /// Current block time aligned down to the checkpoint grid.
  pub fn latest_checkpoint_time(&self) -> u64 {
    self.market_state.latest_checkpoint_time(self.block_time())
  }

  /// Position duration in years.
  pub fn annualized_position_duration(&self) -> Decimal {
    self.position_duration.annualized_time()
  }

  /// Full-term spot price of bonds. `None` while reserves are empty.
  pub fn spot_price(&self) -> Option<Decimal> {
    self
      .pricing_model
      .spot_price(&self.market_state, &self.position_duration.as_stretched_time())
      .ok()
  }

  /// Fixed rate implied by the reserves. `None` (the NaN of the pool)
  /// while share reserves are empty.
  pub fn fixed_apr(&self) -> Option<Decimal> {
    if self.market_state.share_reserves <= Decimal::ZERO {
      return None;
    }
    self
      .pricing_model
      .apr_from_reserves(&self.market_state, &self.position_duration.as_stretched_time())
      .ok()
  }

  /// Record the checkpoint at `checkpoint_time`. Idempotent.
  #[instrument(skip(self), fields(block_time = self.block_time()))]
  pub fn checkpoint(&mut self, checkpoint_time: u64) -> Result<(), MarketError> {
    let block_time = self.block_time();
    let longs_before = self.market_state.longs_outstanding;
    let shorts_before = self.market_state.shorts_outstanding;
    if self.market_state.checkpoint(checkpoint_time, block_time)? {
      debug!(
        checkpoint_time,
        share_price = %self.market_state.share_price,
        matured_longs = %(longs_before - self.market_state.longs_outstanding),
        matured_shorts = %(shorts_before - self.market_state.shorts_outstanding),
        "Checkpoint recorded"
      );
    }
    Ok(())
  }

  /// Grow the share price by the variable rate over `elapsed_secs`.
  pub fn accrue_interest(&mut self, elapsed_secs: u64) -> Result<MarketDeltas, MarketError> {
    let state = &self.market_state;
    let deltas = MarketDeltas {
      d_share_price: state.share_price * state.variable_apr * Decimal::from(elapsed_secs)
        / Decimal::from(SECONDS_PER_YEAR),
      ..MarketDeltas::default()
    };
    if !deltas.is_zero() {
      self.market_state.apply_delta(&deltas)?;
    }
    Ok(deltas)
  }

  /// Validate and execute `action` for `wallet`.
  #[instrument(
    skip(self, action, wallet),
    fields(action = %action.action_type, amount = %action.trade_amount, agent = wallet.address())
  )]
  pub fn perform_action<W: WalletLedger>(
    &mut self,
    action: &MarketAction,
    wallet: &mut W,
  ) -> Result<TradeDeltas, MarketError> {
    action.check()?;
    let amount = action.trade_amount;
    let mint_time = || {
      action.mint_time.ok_or(MarketError::MissingMintTime {
        action: action.action_type.as_str(),
      })
    };
    match action.action_type {
      MarketActionType::InitializeMarket => {
        let target_apr = action.target_apr.ok_or(MarketError::MissingTargetApr)?;
        self.initialize(wallet, amount, target_apr)
      }
      MarketActionType::OpenLong => self.open_long(wallet, amount),
      MarketActionType::CloseLong => self.close_long(wallet, amount, mint_time()?),
      MarketActionType::OpenShort => self.open_short(wallet, amount),
      MarketActionType::CloseShort => {
        let mint_time = mint_time()?;
        let open_share_price = action
          .open_share_price
          .or_else(|| wallet.short_open_share_price(mint_time))
          .ok_or(MarketError::MissingOpenSharePrice)?;
        self.close_short(wallet, amount, mint_time, open_share_price)
      }
      MarketActionType::AddLiquidity => self.add_liquidity(wallet, amount),
      MarketActionType::RemoveLiquidity => self.remove_liquidity(wallet, amount),
      MarketActionType::RedeemWithdrawalShares => self.redeem_withdrawal_shares(wallet, amount),
    }
  }

  /// Seed the pool with `contribution` base priced at `target_apr`.
  pub fn initialize<W: WalletLedger>(
    &mut self,
    wallet: &mut W,
    contribution: Decimal,
    target_apr: Decimal,
  ) -> Result<TradeDeltas, MarketError> {
    let result = self.execute(MarketActionType::InitializeMarket, wallet, |ctx| {
      actions::calc_initialize(ctx, contribution, target_apr)
    });
    if result.is_ok() {
      info!(
        contribution = %contribution,
        target_apr = %target_apr,
        share_reserves = %self.market_state.share_reserves,
        bond_reserves = %self.market_state.bond_reserves,
        "Market initialized"
      );
    }
    result
  }

  pub fn open_long<W: WalletLedger>(
    &mut self,
    wallet: &mut W,
    base_amount: Decimal,
  ) -> Result<TradeDeltas, MarketError> {
    self.execute(MarketActionType::OpenLong, wallet, |ctx| {
      actions::calc_open_long(ctx, base_amount)
    })
  }

  pub fn close_long<W: WalletLedger>(
    &mut self,
    wallet: &mut W,
    bond_amount: Decimal,
    mint_time: u64,
  ) -> Result<TradeDeltas, MarketError> {
    let held = wallet.long_balance(mint_time);
    self.execute(MarketActionType::CloseLong, wallet, |ctx| {
      ensure_held("longs", bond_amount, held)?;
      actions::calc_close_long(ctx, bond_amount, mint_time)
    })
  }

  pub fn open_short<W: WalletLedger>(
    &mut self,
    wallet: &mut W,
    bond_amount: Decimal,
  ) -> Result<TradeDeltas, MarketError> {
    self.execute(MarketActionType::OpenShort, wallet, |ctx| {
      actions::calc_open_short(ctx, bond_amount)
    })
  }

  pub fn close_short<W: WalletLedger>(
    &mut self,
    wallet: &mut W,
    bond_amount: Decimal,
    mint_time: u64,
    open_share_price: Decimal,
  ) -> Result<TradeDeltas, MarketError> {
    let held = wallet.short_balance(mint_time);
    self.execute(MarketActionType::CloseShort, wallet, |ctx| {
      ensure_held("shorts", bond_amount, held)?;
      actions::calc_close_short(ctx, bond_amount, mint_time, open_share_price)
    })
  }

  pub fn add_liquidity<W: WalletLedger>(
    &mut self,
    wallet: &mut W,
    base_amount: Decimal,
  ) -> Result<TradeDeltas, MarketError> {
    self.execute(MarketActionType::AddLiquidity, wallet, |ctx| {
      actions::calc_add_liquidity(ctx, base_amount)
    })
  }

  pub fn remove_liquidity<W: WalletLedger>(
    &mut self,
    wallet: &mut W,
    lp_amount: Decimal,
  ) -> Result<TradeDeltas, MarketError> {
    let held = wallet.lp_tokens();
    self.execute(MarketActionType::RemoveLiquidity, wallet, |ctx| {
      ensure_held("lp tokens", lp_amount, held)?;
      actions::calc_remove_liquidity(ctx, lp_amount)
    })
  }

  pub fn redeem_withdrawal_shares<W: WalletLedger>(
    &mut self,
    wallet: &mut W,
    amount: Decimal,
  ) -> Result<TradeDeltas, MarketError> {
    let held = wallet.withdrawal_shares();
    self.execute(MarketActionType::RedeemWithdrawalShares, wallet, |ctx| {
      ensure_held("withdrawal shares", amount, held)?;
      actions::calc_redeem_withdrawal_shares(ctx, amount)
    })
  }

  /// Shared trade pipeline: implicit checkpoint, price, apply.
  fn execute<W, F>(
    &mut self,
    action_type: MarketActionType,
    wallet: &mut W,
    calc: F,
  ) -> Result<TradeDeltas, MarketError>
  where
    W: WalletLedger,
    F: FnOnce(&ActionContext<'_>) -> Result<TradeDeltas, MarketError>,
  {
    if action_type != MarketActionType::InitializeMarket && !self.market_state.is_initialized() {
      return Err(MarketError::NotInitialized);
    }
    let block_time = self.block_time();
    let checkpoint_time = self.market_state.latest_checkpoint_time(block_time);
    self.market_state.checkpoint(checkpoint_time, block_time)?;

    let ctx = ActionContext {
      state: &self.market_state,
      pricing_model: self.pricing_model,
      position_duration: &self.position_duration,
      checkpoint_time,
      wallet_address: wallet.address(),
    };
    let priced = calc(&ctx).and_then(|(market_deltas, wallet_deltas)| {
      ensure_funded(wallet.base_balance(), &wallet_deltas)?;
      Ok((market_deltas, wallet_deltas))
    });
    let applied = priced.and_then(|(market_deltas, wallet_deltas)| {
      self.market_state.apply_delta(&market_deltas)?;
      Ok((market_deltas, wallet_deltas))
    });

    match applied {
      Ok((market_deltas, wallet_deltas)) => {
        wallet.update(&wallet_deltas);
        debug!(
          action = %action_type,
          agent = wallet_deltas.address,
          checkpoint_time,
          deltas = %market_deltas,
          "Trade executed"
        );
        Ok((market_deltas, wallet_deltas))
      }
      Err(e) => {
        warn!(
          action = %action_type,
          agent = wallet.address(),
          block_time,
          error = %e,
          market_state = ?self.market_state,
          "Trade failed"
        );
        Err(e)
      }
    }
  }
}

fn ensure_held(kind: &'static str, requested: Decimal, held: Decimal) -> Result<(), MarketError> {
  if requested > held {
    return Err(MarketError::InsufficientPosition {
      kind,
      requested,
      held,
    });
  }
  Ok(())
}

fn ensure_funded(balance: Decimal, delta: &WalletDeltas) -> Result<(), MarketError> {
  if delta.balance < Decimal::ZERO && balance + delta.balance < Decimal::ZERO {
    return Err(MarketError::InsufficientPosition {
      kind: "base",
      requested: -delta.balance,
      held: balance,
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::time::{BlockTime, SECONDS_PER_DAY};
  use crate::domain::wallet::Wallet;
  use rust_decimal_macros::dec;

  fn market(clock: Arc<BlockTime>) -> Market {
    let duration = PositionDuration::from_target_apr(dec!(365), dec!(0.05)).unwrap();
    let state = MarketState {
      trade_fee_percent: dec!(0.05),
      redemption_fee_percent: dec!(0.05),
      variable_apr: dec!(0.05),
      ..MarketState::default()
    };
    Market::new(PricingModel::Hyperdrive, state, duration, clock).unwrap()
  }

  fn initialized(clock: Arc<BlockTime>) -> (Market, Wallet) {
    let mut market = market(clock);
    let mut lp = Wallet::new(0, dec!(500_000_000));
    market.initialize(&mut lp, dec!(500_000_000), dec!(0.05)).unwrap();
    (market, lp)
  }

  #[test]
  fn test_rejects_duration_off_checkpoint_grid() {
    let duration = PositionDuration::from_target_apr(dec!(365), dec!(0.05)).unwrap();
    let state = MarketState {
      checkpoint_duration: 7 * SECONDS_PER_DAY,
      ..MarketState::default()
    };
    let err = Market::new(PricingModel::Hyperdrive, state, duration, Arc::new(BlockTime::default()))
      .unwrap_err();
    assert!(err.is_time_error());
  }

  #[test]
  fn test_trades_require_initialization() {
    let mut market = market(Arc::new(BlockTime::default()));
    let mut wallet = Wallet::new(1, dec!(1000));
    let err = market.open_long(&mut wallet, dec!(100)).unwrap_err();
    assert_eq!(err, MarketError::NotInitialized);
    assert_eq!(market.fixed_apr(), None);
    assert_eq!(market.spot_price(), None);
  }

  #[test]
  fn test_initialize_sets_target_rate() {
    let (market, lp) = initialized(Arc::new(BlockTime::default()));
    let apr = market.fixed_apr().unwrap();
    assert!((apr - dec!(0.05)).abs() < dec!(0.00000001), "apr = {apr}");
    assert_eq!(lp.balance, Decimal::ZERO);
    assert_eq!(lp.lp_tokens, market.market_state().lp_total_supply);
    assert!(market.market_state().checkpoints.contains_key(&0));
  }

  #[test]
  fn test_failed_trade_leaves_wallet_untouched() {
    let (mut market, _) = initialized(Arc::new(BlockTime::default()));
    let mut wallet = Wallet::new(1, dec!(100));
    let before = wallet.clone();
    let err = market.open_long(&mut wallet, dec!(1000)).unwrap_err();
    assert!(matches!(err, MarketError::InsufficientPosition { kind: "base", .. }));
    assert_eq!(wallet, before);
    assert_eq!(market.market_state().longs_outstanding, Decimal::ZERO);
  }

  #[test]
  fn test_perform_action_closes_short_with_wallet_open_price() {
    let clock = Arc::new(BlockTime::new(0, 12));
    let (mut market, _) = initialized(clock.clone());
    let mut trader = Wallet::new(1, dec!(1_000_000));
    market.perform_action(&MarketAction::open_short(dec!(100_000)), &mut trader).unwrap();
    clock.tick(SECONDS_PER_DAY);
    let mut close = MarketAction::close_short(dec!(100_000), 0, Decimal::ONE);
    close.open_share_price = None;
    market.perform_action(&close, &mut trader).unwrap();
    assert!(trader.shorts.is_empty());
    assert_eq!(market.market_state().shorts_outstanding, Decimal::ZERO);
  }

  #[test]
  fn test_malformed_action_is_rejected_before_checkpointing() {
    let clock = Arc::new(BlockTime::new(0, 12));
    let (mut market, _) = initialized(clock.clone());
    let mut wallet = Wallet::new(1, dec!(1000));
    clock.tick(SECONDS_PER_DAY);

    let err = market
      .perform_action(&MarketAction::open_long(Decimal::ZERO), &mut wallet)
      .unwrap_err();
    assert_eq!(err, MarketError::InvalidTradeAmount(Decimal::ZERO));

    let mut close = MarketAction::close_long(dec!(10), 0);
    close.mint_time = None;
    let err = market.perform_action(&close, &mut wallet).unwrap_err();
    assert_eq!(err, MarketError::MissingMintTime { action: "close_long" });

    assert!(!market.market_state().checkpoints.contains_key(&SECONDS_PER_DAY));
    assert_eq!(wallet.balance, dec!(1000));
  }

  #[test]
  fn test_accrue_interest_grows_share_price() {
    let (mut market, _) = initialized(Arc::new(BlockTime::default()));
    let deltas = market.accrue_interest(SECONDS_PER_YEAR).unwrap();
    assert_eq!(deltas.d_share_price, dec!(0.05));
    assert_eq!(market.market_state().share_price, dec!(1.05));
  }

  #[test]
  fn test_close_without_position_is_rejected() {
    let (mut market, _) = initialized(Arc::new(BlockTime::default()));
    let mut wallet = Wallet::new(1, dec!(1000));
    let err = market
      .perform_action(&MarketAction::close_long(dec!(10), 0), &mut wallet)
      .unwrap_err();
    assert!(err.is_usage_error());
  }
}
