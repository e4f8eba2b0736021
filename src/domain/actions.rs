//! Trade actions and the calculators that price them.
//!
//! Each calculator reads the market through an [`ActionContext`] and returns
//! the `(MarketDeltas, WalletDeltas)` pair the trade would produce. Nothing is
//! mutated here; the orchestrator applies the market delta through
//! `MarketState::apply_delta` and hands the wallet delta to the wallet.
//!
//! Sign convention: market deltas are from the pool's side, wallet deltas from
//! the trader's. Fees are reported in base and always charged to the trader.
//! Opening a long withholds its fee from the bonds bought; every other trade
//! settles its fee in base, retained in share reserves.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::checkpoint::withdrawal_credit;
use super::errors::MarketError;
use super::market_state::{MarketDeltas, MarketState, MaturityBucket, update_weighted_average};
use super::pricing::{PricingModel, scale_bonds_with_shares};
use super::time::PositionDuration;
use super::wallet::{Long, Short, WalletDeltas};

/// Deltas produced by one trade.
pub type TradeDeltas = (MarketDeltas, WalletDeltas);

// ────────────────────────────────────────────
// Actions
// ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketActionType {
    InitializeMarket,
    OpenLong,
    CloseLong,
    OpenShort,
    CloseShort,
    AddLiquidity,
    RemoveLiquidity,
    RedeemWithdrawalShares,
}

impl MarketActionType {
    pub const ALL: [Self; 8] = [
        Self::InitializeMarket,
        Self::OpenLong,
        Self::CloseLong,
        Self::OpenShort,
        Self::CloseShort,
        Self::AddLiquidity,
        Self::RemoveLiquidity,
        Self::RedeemWithdrawalShares,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitializeMarket => "initialize_market",
            Self::OpenLong => "open_long",
            Self::CloseLong => "close_long",
            Self::OpenShort => "open_short",
            Self::CloseShort => "close_short",
            Self::AddLiquidity => "add_liquidity",
            Self::RemoveLiquidity => "remove_liquidity",
            Self::RedeemWithdrawalShares => "redeem_withdrawal_shares",
        }
    }

    /// Close actions name the position they close by its mint time.
    pub fn requires_mint_time(&self) -> bool {
        matches!(self, Self::CloseLong | Self::CloseShort)
    }
}

impl fmt::Display for MarketActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketActionType {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| MarketError::UnknownActionType(s.to_string()))
    }
}

/// A trade request against the market.
///
/// `trade_amount` is base for opens and liquidity adds, bonds for closes and
/// opening shorts, LP tokens for removals and withdrawal shares for redemptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAction {
    pub action_type: MarketActionType,
    pub trade_amount: Decimal,
    pub mint_time: Option<u64>,
    pub open_share_price: Option<Decimal>,
    pub target_apr: Option<Decimal>,
}

impl MarketAction {
    pub fn new(action_type: MarketActionType, trade_amount: Decimal) -> Self {
        Self {
            action_type,
            trade_amount,
            mint_time: None,
            open_share_price: None,
            target_apr: None,
        }
    }

    pub fn initialize(contribution: Decimal, target_apr: Decimal) -> Self {
        Self {
            target_apr: Some(target_apr),
            ..Self::new(MarketActionType::InitializeMarket, contribution)
        }
    }

    pub fn open_long(base_amount: Decimal) -> Self {
        Self::new(MarketActionType::OpenLong, base_amount)
    }

    pub fn close_long(bond_amount: Decimal, mint_time: u64) -> Self {
        Self {
            mint_time: Some(mint_time),
            ..Self::new(MarketActionType::CloseLong, bond_amount)
        }
    }

    pub fn open_short(bond_amount: Decimal) -> Self {
        Self::new(MarketActionType::OpenShort, bond_amount)
    }

    pub fn close_short(bond_amount: Decimal, mint_time: u64, open_share_price: Decimal) -> Self {
        Self {
            mint_time: Some(mint_time),
            open_share_price: Some(open_share_price),
            ..Self::new(MarketActionType::CloseShort, bond_amount)
        }
    }

    pub fn add_liquidity(base_amount: Decimal) -> Self {
        Self::new(MarketActionType::AddLiquidity, base_amount)
    }

    pub fn remove_liquidity(lp_amount: Decimal) -> Self {
        Self::new(MarketActionType::RemoveLiquidity, lp_amount)
    }

    pub fn redeem_withdrawal_shares(amount: Decimal) -> Self {
        Self::new(MarketActionType::RedeemWithdrawalShares, amount)
    }

    /// Validate the request's shape before it touches the market.
    pub fn check(&self) -> Result<(), MarketError> {
        ensure_positive(self.trade_amount)?;
        if self.action_type.requires_mint_time() && self.mint_time.is_none() {
            return Err(MarketError::MissingMintTime {
                action: self.action_type.as_str(),
            });
        }
        if self.action_type == MarketActionType::InitializeMarket && self.target_apr.is_none() {
            return Err(MarketError::MissingTargetApr);
        }
        Ok(())
    }
}

// ────────────────────────────────────────────
// Calculators
// ────────────────────────────────────────────

/// Read-only view of the market a calculator prices against.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub state: &'a MarketState,
    pub pricing_model: PricingModel,
    pub position_duration: &'a PositionDuration,
    /// Latest checkpoint time; positions opened now are minted here.
    pub checkpoint_time: u64,
    pub wallet_address: u64,
}

impl ActionContext<'_> {
    fn maturity_of(&self, mint_time: u64) -> u64 {
        mint_time + self.position_duration.seconds()
    }

    fn wallet_deltas(&self) -> WalletDeltas {
        WalletDeltas::new(self.wallet_address)
    }

    fn long_average_delta(&self, maturity: u64, amount: Decimal, is_adding: bool) -> Decimal {
        let state = self.state;
        update_weighted_average(
            state.long_average_maturity_time,
            state.longs_outstanding,
            Decimal::from(maturity),
            amount,
            is_adding,
        ) - state.long_average_maturity_time
    }

    fn short_average_delta(&self, maturity: u64, amount: Decimal, is_adding: bool) -> Decimal {
        let state = self.state;
        update_weighted_average(
            state.short_average_maturity_time,
            state.shorts_outstanding,
            Decimal::from(maturity),
            amount,
            is_adding,
        ) - state.short_average_maturity_time
    }

    /// Settlement price for positions maturing at `maturity`, which must
    /// already have been checkpointed.
    fn matured_share_price(&self, maturity: u64) -> Result<Decimal, MarketError> {
        let bucket = self.state.bucket(maturity);
        match self.state.checkpoints.get(&maturity) {
            Some(checkpoint) if bucket.longs.is_zero() && bucket.shorts.is_zero() => {
                Ok(checkpoint.share_price)
            }
            _ => Err(MarketError::InvariantViolation(format!(
                "positions maturing at {maturity} have not been settled by a checkpoint"
            ))),
        }
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), MarketError> {
    if amount <= Decimal::ZERO {
        return Err(MarketError::InvalidTradeAmount(amount));
    }
    Ok(())
}

fn ensure_solvent(state: &MarketState, d_shares: Decimal, d_base_buffer: Decimal) -> Result<(), MarketError> {
    let share_reserves = state.share_reserves + d_shares;
    if share_reserves <= Decimal::ZERO {
        return Err(MarketError::InsufficientLiquidity(
            "trade would exhaust share reserves".to_string(),
        ));
    }
    let buffer = state.base_buffer + d_base_buffer;
    if share_reserves * state.share_price < buffer {
        return Err(MarketError::InsufficientLiquidity(format!(
            "share reserves cannot cover base buffer of {buffer}"
        )));
    }
    Ok(())
}

/// Base volume attributable to `amount` of a bucket's `held` positions.
fn pro_rata_volume(volume: Decimal, amount: Decimal, held: Decimal) -> Decimal {
    if amount >= held {
        volume
    } else {
        volume * amount / held
    }
}

/// Seed an empty market with `contribution` base priced at `target_apr`.
pub fn calc_initialize(
    ctx: &ActionContext<'_>,
    contribution: Decimal,
    target_apr: Decimal,
) -> Result<TradeDeltas, MarketError> {
    let state = ctx.state;
    if state.is_initialized() {
        return Err(MarketError::AlreadyInitialized);
    }
    ensure_positive(contribution)?;
    let share_reserves = contribution / state.share_price;
    let seeded = MarketState {
        share_reserves,
        ..state.clone()
    };
    let bond_reserves = ctx.pricing_model.bond_reserves_for_target_apr(
        target_apr,
        &ctx.position_duration.as_stretched_time(),
        &seeded,
    )?;
    let lp_tokens = share_reserves * state.share_price + bond_reserves;

    let deltas = MarketDeltas {
        d_share_reserves: share_reserves,
        d_bond_reserves: bond_reserves,
        d_lp_total_supply: lp_tokens,
        ..MarketDeltas::default()
    };
    let mut wallet = ctx.wallet_deltas();
    wallet.balance = -contribution;
    wallet.lp_tokens = lp_tokens;
    Ok((deltas, wallet))
}

/// Buy full-term bonds with `base_amount`.
pub fn calc_open_long(ctx: &ActionContext<'_>, base_amount: Decimal) -> Result<TradeDeltas, MarketError> {
    ensure_positive(base_amount)?;
    let state = ctx.state;
    let quote = ctx
        .pricing_model
        .quote_open_long(state, ctx.position_duration, base_amount)?;
    let fee_bonds = quote
        .curve_fee
        .checked_div(quote.spot_price)
        .ok_or_else(|| MarketError::Arithmetic(format!("cannot price a fee at spot {}", quote.spot_price)))?;
    let bonds = quote.curve_bonds - fee_bonds;
    if bonds < base_amount {
        return Err(MarketError::NegativeInterest(format!(
            "{base_amount} base would buy only {bonds} bonds"
        )));
    }
    ensure_solvent(state, quote.curve_shares, bonds)?;

    let maturity = ctx.maturity_of(ctx.checkpoint_time);
    let mut deltas = MarketDeltas {
        d_share_reserves: quote.curve_shares,
        d_bond_reserves: -bonds,
        d_base_buffer: bonds,
        d_longs_outstanding: bonds,
        d_long_average_maturity_time: ctx.long_average_delta(maturity, bonds, true),
        d_long_base_volume: base_amount,
        ..MarketDeltas::default()
    };
    deltas.add_position(
        maturity,
        MaturityBucket {
            longs: bonds,
            long_base_volume: base_amount,
            ..MaturityBucket::default()
        },
    );

    let mut wallet = ctx.wallet_deltas();
    wallet.balance = -base_amount;
    wallet.longs.insert(ctx.checkpoint_time, Long { balance: bonds });
    wallet.fees_paid = quote.curve_fee;
    Ok((deltas, wallet))
}

/// Sell `bond_amount` of the long minted at `mint_time` back to the pool.
pub fn calc_close_long(
    ctx: &ActionContext<'_>,
    bond_amount: Decimal,
    mint_time: u64,
) -> Result<TradeDeltas, MarketError> {
    ensure_positive(bond_amount)?;
    let state = ctx.state;
    let share_price = state.share_price;
    let maturity = ctx.maturity_of(mint_time);
    let remaining = ctx
        .position_duration
        .normalized_time_remaining(mint_time, ctx.checkpoint_time);

    let mut wallet = ctx.wallet_deltas();
    wallet.longs.insert(mint_time, Long { balance: -bond_amount });

    if remaining.is_zero() {
        // Matured longs were paid out of reserves at their checkpoint.
        ctx.matured_share_price(maturity)?;
        let fee = ctx.pricing_model.redemption_fee(state, bond_amount);
        let d_shares = fee / share_price;
        let deltas = MarketDeltas {
            d_share_reserves: d_shares,
            d_bond_reserves: scale_bonds_with_shares(state.share_reserves, state.bond_reserves, d_shares),
            ..MarketDeltas::default()
        };
        wallet.balance = bond_amount - fee;
        wallet.fees_paid = fee;
        return Ok((deltas, wallet));
    }

    let bucket = state.bucket(maturity);
    if bucket.longs < bond_amount {
        return Err(MarketError::InsufficientPosition {
            kind: "longs",
            requested: bond_amount,
            held: bucket.longs,
        });
    }
    let quote = ctx.pricing_model.quote_sell_bonds(
        state,
        ctx.position_duration,
        remaining,
        bond_amount,
    )?;
    let base_out = quote.shares() * share_price - quote.total_fee();
    if base_out < Decimal::ZERO {
        return Err(MarketError::NegativeInterest(format!(
            "closing {bond_amount} bonds would cost the trader {}",
            -base_out
        )));
    }

    let curve_d_shares = quote.curve_fee / share_price - quote.curve_shares;
    let curve_share_reserves = state.share_reserves + curve_d_shares;
    let curve_bond_reserves = state.bond_reserves + quote.curve_bonds;
    let credited = withdrawal_credit(
        bond_amount - base_out,
        state.long_withdrawal_shares_outstanding,
        state.longs_outstanding,
    );
    let flat_d_shares = (quote.flat_fee - credited) / share_price - quote.flat_shares;
    ensure_solvent(state, curve_d_shares + flat_d_shares, -bond_amount)?;

    let volume = pro_rata_volume(bucket.long_base_volume, bond_amount, bucket.longs);
    let mut deltas = MarketDeltas {
        d_share_reserves: curve_d_shares + flat_d_shares,
        d_bond_reserves: quote.curve_bonds
            + scale_bonds_with_shares(curve_share_reserves, curve_bond_reserves, flat_d_shares),
        d_base_buffer: -bond_amount,
        d_longs_outstanding: -bond_amount,
        d_long_average_maturity_time: ctx.long_average_delta(maturity, bond_amount, false),
        d_long_base_volume: -volume,
        d_long_withdrawal_share_proceeds: credited,
        ..MarketDeltas::default()
    };
    deltas.add_position(
        maturity,
        MaturityBucket {
            longs: -bond_amount,
            long_base_volume: -volume,
            ..MaturityBucket::default()
        },
    );

    wallet.balance = base_out;
    wallet.fees_paid = quote.total_fee();
    Ok((deltas, wallet))
}

/// Short `bond_amount` full-term bonds.
///
/// The trader escrows the bonds' face value at the current share price and
/// is credited the curve proceeds; the difference plus fees is deposited.
pub fn calc_open_short(ctx: &ActionContext<'_>, bond_amount: Decimal) -> Result<TradeDeltas, MarketError> {
    ensure_positive(bond_amount)?;
    let state = ctx.state;
    let share_price = state.share_price;
    let quote = ctx.pricing_model.quote_sell_bonds(
        state,
        ctx.position_duration,
        Decimal::ONE,
        bond_amount,
    )?;
    let proceeds = quote.curve_shares * share_price;
    let open_share_price = state
        .checkpoints
        .get(&ctx.checkpoint_time)
        .map_or(share_price, |checkpoint| checkpoint.share_price);
    let deposit = bond_amount * share_price / open_share_price - proceeds + quote.curve_fee;
    if deposit <= Decimal::ZERO {
        return Err(MarketError::NegativeInterest(format!(
            "shorting {bond_amount} bonds would pay the trader to open"
        )));
    }
    let d_shares = quote.curve_fee / share_price - quote.curve_shares;
    ensure_solvent(state, d_shares, Decimal::ZERO)?;

    let maturity = ctx.maturity_of(ctx.checkpoint_time);
    let mut deltas = MarketDeltas {
        d_share_reserves: d_shares,
        d_bond_reserves: bond_amount,
        d_bond_buffer: bond_amount,
        d_shorts_outstanding: bond_amount,
        d_short_average_maturity_time: ctx.short_average_delta(maturity, bond_amount, true),
        d_short_base_volume: proceeds,
        ..MarketDeltas::default()
    };
    deltas.add_position(
        maturity,
        MaturityBucket {
            shorts: bond_amount,
            short_base_volume: proceeds,
            ..MaturityBucket::default()
        },
    );

    let mut wallet = ctx.wallet_deltas();
    wallet.balance = -deposit;
    wallet.shorts.insert(
        ctx.checkpoint_time,
        Short {
            balance: bond_amount,
            open_share_price,
        },
    );
    wallet.fees_paid = quote.curve_fee;
    Ok((deltas, wallet))
}

/// Buy back `bond_amount` of the short minted at `mint_time`.
pub fn calc_close_short(
    ctx: &ActionContext<'_>,
    bond_amount: Decimal,
    mint_time: u64,
    open_share_price: Decimal,
) -> Result<TradeDeltas, MarketError> {
    ensure_positive(bond_amount)?;
    if open_share_price <= Decimal::ZERO {
        return Err(MarketError::InvalidTradeAmount(open_share_price));
    }
    let state = ctx.state;
    let share_price = state.share_price;
    let maturity = ctx.maturity_of(mint_time);
    let remaining = ctx
        .position_duration
        .normalized_time_remaining(mint_time, ctx.checkpoint_time);

    let mut wallet = ctx.wallet_deltas();
    wallet.shorts.insert(
        mint_time,
        Short {
            balance: -bond_amount,
            open_share_price,
        },
    );

    if remaining.is_zero() {
        // The pool was paid the face value at the maturity checkpoint; the
        // trader keeps the interest the escrow earned until then.
        let closing_share_price = ctx.matured_share_price(maturity)?;
        let interest = (bond_amount * closing_share_price / open_share_price - bond_amount)
            .max(Decimal::ZERO);
        let fee = ctx.pricing_model.redemption_fee(state, bond_amount).min(interest);
        let d_shares = fee / share_price;
        let deltas = MarketDeltas {
            d_share_reserves: d_shares,
            d_bond_reserves: scale_bonds_with_shares(state.share_reserves, state.bond_reserves, d_shares),
            ..MarketDeltas::default()
        };
        wallet.balance = interest - fee;
        wallet.fees_paid = fee;
        return Ok((deltas, wallet));
    }

    let bucket = state.bucket(maturity);
    if bucket.shorts < bond_amount {
        return Err(MarketError::InsufficientPosition {
            kind: "shorts",
            requested: bond_amount,
            held: bucket.shorts,
        });
    }
    let quote = ctx.pricing_model.quote_buy_bonds(
        state,
        ctx.position_duration,
        remaining,
        bond_amount,
    )?;
    let cost = quote.shares() * share_price + quote.total_fee();
    let escrow = bond_amount * share_price / open_share_price;
    let proceeds = escrow - cost;
    if proceeds < Decimal::ZERO {
        return Err(MarketError::NegativeInterest(format!(
            "escrow of {escrow} cannot cover closing cost of {cost}"
        )));
    }

    let curve_d_shares = quote.curve_shares + quote.curve_fee / share_price;
    let curve_share_reserves = state.share_reserves + curve_d_shares;
    let curve_bond_reserves = state.bond_reserves - quote.curve_bonds;
    let credited = withdrawal_credit(
        cost,
        state.short_withdrawal_shares_outstanding,
        state.shorts_outstanding,
    );
    let flat_d_shares = quote.flat_shares + (quote.flat_fee - credited) / share_price;

    let volume = pro_rata_volume(bucket.short_base_volume, bond_amount, bucket.shorts);
    let mut deltas = MarketDeltas {
        d_share_reserves: curve_d_shares + flat_d_shares,
        d_bond_reserves: scale_bonds_with_shares(curve_share_reserves, curve_bond_reserves, flat_d_shares)
            - quote.curve_bonds,
        d_bond_buffer: -bond_amount,
        d_shorts_outstanding: -bond_amount,
        d_short_average_maturity_time: ctx.short_average_delta(maturity, bond_amount, false),
        d_short_base_volume: -volume,
        d_short_withdrawal_share_proceeds: credited,
        ..MarketDeltas::default()
    };
    deltas.add_position(
        maturity,
        MaturityBucket {
            shorts: -bond_amount,
            short_base_volume: -volume,
            ..MaturityBucket::default()
        },
    );

    wallet.balance = proceeds;
    wallet.fees_paid = quote.total_fee();
    Ok((deltas, wallet))
}

/// Contribute `base_amount` for LP tokens priced against the pool's value,
/// short capital still locked included.
pub fn calc_add_liquidity(ctx: &ActionContext<'_>, base_amount: Decimal) -> Result<TradeDeltas, MarketError> {
    ensure_positive(base_amount)?;
    let state = ctx.state;
    let value = state.lp_pool_value();
    if state.idle_base() < Decimal::ZERO || value <= Decimal::ZERO || state.lp_total_supply <= Decimal::ZERO {
        return Err(MarketError::InsufficientLiquidity(format!(
            "no pool value to price LP tokens against (value {value})"
        )));
    }
    let lp_out = base_amount * state.lp_total_supply / value;
    let d_shares = base_amount / state.share_price;
    let deltas = MarketDeltas {
        d_share_reserves: d_shares,
        d_bond_reserves: scale_bonds_with_shares(state.share_reserves, state.bond_reserves, d_shares),
        d_lp_total_supply: lp_out,
        ..MarketDeltas::default()
    };
    let mut wallet = ctx.wallet_deltas();
    wallet.balance = -base_amount;
    wallet.lp_tokens = lp_out;
    Ok((deltas, wallet))
}

/// Burn `lp_amount` LP tokens for their slice of the pool's value.
///
/// The claim is paid in base out of idle capital first. Whatever idle
/// capital cannot cover is still locked behind open shorts and is issued
/// as short withdrawal shares, paid as those shorts close or mature.
pub fn calc_remove_liquidity(ctx: &ActionContext<'_>, lp_amount: Decimal) -> Result<TradeDeltas, MarketError> {
    ensure_positive(lp_amount)?;
    let state = ctx.state;
    if lp_amount > state.lp_total_supply {
        return Err(MarketError::InsufficientLiquidity(format!(
            "cannot burn {lp_amount} of {} LP tokens",
            state.lp_total_supply
        )));
    }
    let idle = state.idle_base();
    if idle < Decimal::ZERO {
        return Err(MarketError::InsufficientLiquidity(format!(
            "idle capital is negative ({idle})"
        )));
    }
    let claim = lp_amount / state.lp_total_supply * state.lp_pool_value();
    let base_out = claim.min(idle);
    let withdrawal_shares = claim - base_out;
    let d_shares = -base_out / state.share_price;
    let d_bonds = scale_bonds_with_shares(state.share_reserves, state.bond_reserves, d_shares);
    if state.bond_reserves + d_bonds < state.bond_buffer {
        return Err(MarketError::InsufficientLiquidity(
            "bond reserves would not cover outstanding shorts".to_string(),
        ));
    }

    let deltas = MarketDeltas {
        d_share_reserves: d_shares,
        d_bond_reserves: d_bonds,
        d_lp_total_supply: -lp_amount,
        d_short_withdrawal_shares_outstanding: withdrawal_shares,
        ..MarketDeltas::default()
    };
    let mut wallet = ctx.wallet_deltas();
    wallet.balance = base_out;
    wallet.lp_tokens = -lp_amount;
    wallet.withdrawal_shares = withdrawal_shares;
    Ok((deltas, wallet))
}

/// Redeem `amount` withdrawal shares for their pro-rata slice of the
/// proceeds released so far. Reserves are untouched.
pub fn calc_redeem_withdrawal_shares(
    ctx: &ActionContext<'_>,
    amount: Decimal,
) -> Result<TradeDeltas, MarketError> {
    ensure_positive(amount)?;
    let state = ctx.state;
    let total = state.total_withdrawal_shares();
    if amount > total {
        return Err(MarketError::InsufficientPosition {
            kind: "withdrawal shares",
            requested: amount,
            held: total,
        });
    }
    let mut deltas = MarketDeltas::default();
    if amount == total {
        deltas.d_long_withdrawal_shares_outstanding = -state.long_withdrawal_shares_outstanding;
        deltas.d_short_withdrawal_shares_outstanding = -state.short_withdrawal_shares_outstanding;
        deltas.d_long_withdrawal_share_proceeds = -state.long_withdrawal_share_proceeds;
        deltas.d_short_withdrawal_share_proceeds = -state.short_withdrawal_share_proceeds;
    } else {
        let fraction = amount / total;
        deltas.d_long_withdrawal_shares_outstanding = -fraction * state.long_withdrawal_shares_outstanding;
        deltas.d_short_withdrawal_shares_outstanding = -fraction * state.short_withdrawal_shares_outstanding;
        deltas.d_long_withdrawal_share_proceeds = -fraction * state.long_withdrawal_share_proceeds;
        deltas.d_short_withdrawal_share_proceeds = -fraction * state.short_withdrawal_share_proceeds;
    }

    let mut wallet = ctx.wallet_deltas();
    wallet.balance = -(deltas.d_long_withdrawal_share_proceeds + deltas.d_short_withdrawal_share_proceeds);
    wallet.withdrawal_shares = -amount;
    Ok((deltas, wallet))
}
