//! Bonding-curve pricing models for fixed-rate pools.
//!
//! Both variants share the YieldSpace invariant
//!
//!   k = (c/μ)·(μ·z)^(1-t) + y^(1-t)
//!
//! where `z` are share reserves, `y` bond reserves, `c` the share price,
//! `μ` the initial share price and `t` the stretched time exponent.
//! Spot price is `(μ·z / y)^t` base per bond.
//!
//! - `YieldSpace` trades every bond on the curve, with the exponent taken
//!   from the time left on the position.
//! - `Hyperdrive` splits a trade: the matured fraction settles flat at the
//!   share price, the rest trades on the curve with the full-term exponent.
//!
//! Stored amounts are `Decimal`. Fractional powers are evaluated in `f64`
//! and converted back; a non-finite result is an error, never a default.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::errors::MarketError;
use super::market_state::MarketState;
use super::time::{PositionDuration, StretchedTime};

const TIME_STRETCH_NUMERATOR: Decimal = dec!(3.09396);
const TIME_STRETCH_DENOMINATOR: Decimal = dec!(0.02789);

/// Time stretch that gives sensible slippage for a pool targeting `apr`.
pub fn calc_time_stretch(apr: Decimal) -> Result<Decimal, MarketError> {
    if apr <= Decimal::ZERO {
        return Err(MarketError::InvalidPositionDuration(format!(
            "time stretch needs a positive target apr, got {apr}"
        )));
    }
    Ok(TIME_STRETCH_NUMERATOR / (TIME_STRETCH_DENOMINATOR * apr * Decimal::ONE_HUNDRED))
}

/// Annualized rate implied by a bond price over `time_remaining`.
pub fn apr_from_spot_price(
    price: Decimal,
    time_remaining: &StretchedTime,
) -> Result<Decimal, MarketError> {
    let annualized = time_remaining.annualized_time();
    if price <= Decimal::ZERO || annualized <= Decimal::ZERO {
        return Err(MarketError::Arithmetic(format!(
            "apr undefined for price {price} over {annualized} years"
        )));
    }
    Ok((Decimal::ONE - price) / (price * annualized))
}

/// Bond price implied by an annualized rate over `time_remaining`.
pub fn spot_price_from_apr(apr: Decimal, time_remaining: &StretchedTime) -> Decimal {
    Decimal::ONE / (Decimal::ONE + apr * time_remaining.annualized_time())
}

/// Bond reserve change that keeps the spot price fixed when share reserves
/// move by `d_shares` outside the curve.
pub fn scale_bonds_with_shares(
    share_reserves: Decimal,
    bond_reserves: Decimal,
    d_shares: Decimal,
) -> Decimal {
    if share_reserves.is_zero() {
        return Decimal::ZERO;
    }
    bond_reserves * d_shares / share_reserves
}

pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

pub(crate) fn from_f64(value: f64, what: &str) -> Result<Decimal, MarketError> {
    if !value.is_finite() {
        return Err(MarketError::Arithmetic(format!("{what} is not finite")));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| MarketError::Arithmetic(format!("{what} out of range: {value}")))
}

/// The invariant evaluated at one reserve snapshot.
#[derive(Debug, Clone, Copy)]
struct Curve {
    z: f64,
    y: f64,
    c: f64,
    mu: f64,
    t: f64,
}

impl Curve {
    fn new(state: &MarketState, stretched_time: Decimal) -> Result<Self, MarketError> {
        if state.share_reserves <= Decimal::ZERO || state.bond_reserves <= Decimal::ZERO {
            return Err(MarketError::EmptyReserves);
        }
        let t = to_f64(stretched_time);
        if !(0.0..1.0).contains(&t) {
            return Err(MarketError::Arithmetic(format!(
                "stretched time must be in [0, 1), got {stretched_time}"
            )));
        }
        Ok(Self {
            z: to_f64(state.share_reserves),
            y: to_f64(state.bond_reserves),
            c: to_f64(state.share_price),
            mu: to_f64(state.init_share_price),
            t,
        })
    }

    fn one_minus_t(&self) -> f64 {
        1.0 - self.t
    }

    fn share_term(&self, z: f64) -> f64 {
        (self.c / self.mu) * (self.mu * z).powf(self.one_minus_t())
    }

    fn k(&self) -> f64 {
        self.share_term(self.z) + self.y.powf(self.one_minus_t())
    }

    fn spot_price(&self) -> f64 {
        (self.mu * self.z / self.y).powf(self.t)
    }

    /// Share reserves that put the curve back on `k` given the bond term.
    fn solve_shares(&self, remaining: f64) -> f64 {
        (remaining * self.mu / self.c).powf(1.0 / self.one_minus_t()) / self.mu
    }

    fn bonds_out_given_shares_in(&self, shares_in: f64) -> Result<f64, MarketError> {
        let remaining = self.k() - self.share_term(self.z + shares_in);
        if remaining <= 0.0 {
            return Err(MarketError::InsufficientLiquidity(
                "trade would drain bond reserves".to_string(),
            ));
        }
        Ok(self.y - remaining.powf(1.0 / self.one_minus_t()))
    }

    fn shares_out_given_bonds_in(&self, bonds_in: f64) -> Result<f64, MarketError> {
        let remaining = self.k() - (self.y + bonds_in).powf(self.one_minus_t());
        if remaining <= 0.0 {
            return Err(MarketError::InsufficientLiquidity(
                "trade would drain share reserves".to_string(),
            ));
        }
        Ok(self.z - self.solve_shares(remaining))
    }

    fn shares_in_given_bonds_out(&self, bonds_out: f64) -> Result<f64, MarketError> {
        if bonds_out >= self.y {
            return Err(MarketError::InsufficientLiquidity(format!(
                "cannot buy {bonds_out} bonds from reserves of {}",
                self.y
            )));
        }
        let remaining = self.k() - (self.y - bonds_out).powf(self.one_minus_t());
        Ok(self.solve_shares(remaining) - self.z)
    }
}

/// Breakdown of a priced trade. Fees are denominated in base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuote {
    /// Spot price before the trade, at the curve's exponent.
    pub spot_price: Decimal,
    pub flat_bonds: Decimal,
    pub curve_bonds: Decimal,
    pub flat_shares: Decimal,
    pub curve_shares: Decimal,
    pub curve_fee: Decimal,
    pub flat_fee: Decimal,
}

impl TradeQuote {
    pub fn shares(&self) -> Decimal {
        self.flat_shares + self.curve_shares
    }

    pub fn bonds(&self) -> Decimal {
        self.flat_bonds + self.curve_bonds
    }

    pub fn total_fee(&self) -> Decimal {
        self.curve_fee + self.flat_fee
    }
}

/// Pricing model variants sharing one operation set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    YieldSpace,
    #[default]
    Hyperdrive,
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YieldSpace => write!(f, "YieldSpace"),
            Self::Hyperdrive => write!(f, "Hyperdrive"),
        }
    }
}

impl PricingModel {
    pub fn calc_time_stretch(&self, apr: Decimal) -> Result<Decimal, MarketError> {
        calc_time_stretch(apr)
    }

    /// Spot price of bonds in base. Fails on empty reserves.
    pub fn spot_price(
        &self,
        state: &MarketState,
        time_remaining: &StretchedTime,
    ) -> Result<Decimal, MarketError> {
        let curve = Curve::new(state, time_remaining.stretched_time())?;
        from_f64(curve.spot_price(), "spot price")
    }

    pub fn apr_from_spot_price(
        &self,
        price: Decimal,
        time_remaining: &StretchedTime,
    ) -> Result<Decimal, MarketError> {
        apr_from_spot_price(price, time_remaining)
    }

    pub fn apr_from_reserves(
        &self,
        state: &MarketState,
        time_remaining: &StretchedTime,
    ) -> Result<Decimal, MarketError> {
        let price = self.spot_price(state, time_remaining)?;
        apr_from_spot_price(price, time_remaining)
    }

    /// Bond reserves that price the pool at `target_apr` given its share reserves.
    ///
    /// Inverts the spot price: `y = μ·z·(1 + r·T)^(1/t)`.
    pub fn bond_reserves_for_target_apr(
        &self,
        target_apr: Decimal,
        time_remaining: &StretchedTime,
        state: &MarketState,
    ) -> Result<Decimal, MarketError> {
        if state.share_reserves <= Decimal::ZERO {
            return Err(MarketError::EmptyReserves);
        }
        let t = to_f64(time_remaining.stretched_time());
        if t <= 0.0 {
            return Err(MarketError::Arithmetic(
                "cannot target a rate with no time remaining".to_string(),
            ));
        }
        let growth = to_f64(Decimal::ONE + target_apr * time_remaining.annualized_time());
        let mu_z = to_f64(state.init_share_price * state.share_reserves);
        from_f64(mu_z * growth.powf(1.0 / t), "bond reserves")
    }

    /// Stretched time the curve is evaluated at for a position with
    /// `normalized_remaining` of its term left.
    pub fn curve_time(
        &self,
        duration: &PositionDuration,
        normalized_remaining: Decimal,
    ) -> StretchedTime {
        match self {
            Self::Hyperdrive => duration.as_stretched_time(),
            Self::YieldSpace => duration.time_remaining(normalized_remaining),
        }
    }

    /// Portion of a trade that settles flat at the share price.
    pub fn flat_fraction(&self, normalized_remaining: Decimal) -> Decimal {
        match self {
            Self::Hyperdrive => Decimal::ONE - normalized_remaining,
            Self::YieldSpace => Decimal::ZERO,
        }
    }

    /// Flat redemption fee on matured bonds. YieldSpace charges none.
    pub fn redemption_fee(&self, state: &MarketState, matured_bonds: Decimal) -> Decimal {
        match self {
            Self::Hyperdrive => state.redemption_fee_percent * matured_bonds,
            Self::YieldSpace => Decimal::ZERO,
        }
    }

    /// Price a full-term purchase of bonds with `base_amount`.
    pub fn quote_open_long(
        &self,
        state: &MarketState,
        duration: &PositionDuration,
        base_amount: Decimal,
    ) -> Result<TradeQuote, MarketError> {
        let curve = Curve::new(state, duration.stretched_time())?;
        let spot_price = from_f64(curve.spot_price(), "spot price")?;
        let shares_in = base_amount / state.share_price;
        let bonds_out = from_f64(
            curve.bonds_out_given_shares_in(to_f64(shares_in))?,
            "bonds out",
        )?;
        // The fee is withheld from the bonds bought; quote it at their base value.
        let fee_bonds = state.trade_fee_percent * (Decimal::ONE - spot_price) * bonds_out;
        Ok(TradeQuote {
            spot_price,
            curve_bonds: bonds_out,
            curve_shares: shares_in,
            curve_fee: fee_bonds * spot_price,
            ..TradeQuote::default()
        })
    }

    /// Price selling `bond_amount` bonds into the pool (close long, open short).
    pub fn quote_sell_bonds(
        &self,
        state: &MarketState,
        duration: &PositionDuration,
        normalized_remaining: Decimal,
        bond_amount: Decimal,
    ) -> Result<TradeQuote, MarketError> {
        let (mut quote, curve) = self.split(state, duration, normalized_remaining, bond_amount)?;
        if quote.curve_bonds > Decimal::ZERO {
            quote.curve_shares = from_f64(
                curve.shares_out_given_bonds_in(to_f64(quote.curve_bonds))?,
                "shares out",
            )?;
        }
        Ok(quote)
    }

    /// Price buying `bond_amount` bonds out of the pool (close short).
    pub fn quote_buy_bonds(
        &self,
        state: &MarketState,
        duration: &PositionDuration,
        normalized_remaining: Decimal,
        bond_amount: Decimal,
    ) -> Result<TradeQuote, MarketError> {
        let (mut quote, curve) = self.split(state, duration, normalized_remaining, bond_amount)?;
        if quote.curve_bonds > Decimal::ZERO {
            quote.curve_shares = from_f64(
                curve.shares_in_given_bonds_out(to_f64(quote.curve_bonds))?,
                "shares in",
            )?;
        }
        Ok(quote)
    }

    /// Split a bond amount into flat and curve parts and price the flat part.
    fn split(
        &self,
        state: &MarketState,
        duration: &PositionDuration,
        normalized_remaining: Decimal,
        bond_amount: Decimal,
    ) -> Result<(TradeQuote, Curve), MarketError> {
        let curve_time = self.curve_time(duration, normalized_remaining);
        let curve = Curve::new(state, curve_time.stretched_time())?;
        let spot_price = from_f64(curve.spot_price(), "spot price")?;
        let flat_bonds = bond_amount * self.flat_fraction(normalized_remaining);
        let curve_bonds = bond_amount - flat_bonds;
        let quote = TradeQuote {
            spot_price,
            flat_bonds,
            curve_bonds,
            flat_shares: flat_bonds / state.share_price,
            curve_shares: Decimal::ZERO,
            curve_fee: state.trade_fee_percent * (Decimal::ONE - spot_price) * curve_bonds,
            flat_fee: self.redemption_fee(state, flat_bonds),
        };
        Ok((quote, curve))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duration() -> PositionDuration {
        PositionDuration::from_target_apr(dec!(365), dec!(0.05)).unwrap()
    }

    fn pool(fee: Decimal) -> MarketState {
        let model = PricingModel::Hyperdrive;
        let mut state = MarketState {
            share_reserves: dec!(500_000_000),
            trade_fee_percent: fee,
            redemption_fee_percent: fee,
            ..MarketState::default()
        };
        state.bond_reserves = model
            .bond_reserves_for_target_apr(dec!(0.05), &duration().as_stretched_time(), &state)
            .unwrap();
        state
    }

    fn close_enough(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn test_time_stretch_for_five_percent() {
        let stretch = calc_time_stretch(dec!(0.05)).unwrap();
        assert!(close_enough(stretch, dec!(22.186877016851916), dec!(0.000000001)));
        assert!(calc_time_stretch(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_apr_spot_price_inverse() {
        let time = duration().as_stretched_time();
        let price = spot_price_from_apr(dec!(0.05), &time);
        let apr = apr_from_spot_price(price, &time).unwrap();
        assert!(close_enough(apr, dec!(0.05), dec!(0.0000000001)));
    }

    #[test]
    fn test_target_apr_reserves_price_the_pool() {
        let state = pool(Decimal::ZERO);
        let apr = PricingModel::Hyperdrive
            .apr_from_reserves(&state, &duration().as_stretched_time())
            .unwrap();
        assert!(close_enough(apr, dec!(0.05), dec!(0.00000001)), "apr = {apr}");
    }

    #[test]
    fn test_spot_price_requires_reserves() {
        let state = MarketState::default();
        let err = PricingModel::YieldSpace
            .spot_price(&state, &duration().as_stretched_time())
            .unwrap_err();
        assert_eq!(err, MarketError::EmptyReserves);
    }

    #[test]
    fn test_open_long_earns_positive_interest() {
        let state = pool(Decimal::ZERO);
        let quote = PricingModel::Hyperdrive
            .quote_open_long(&state, &duration(), dec!(10_000_000))
            .unwrap();
        assert!(quote.curve_bonds > dec!(10_000_000));
        assert!(quote.curve_bonds < dec!(10_600_000));
        assert_eq!(quote.total_fee(), Decimal::ZERO);
    }

    #[test]
    fn test_fee_scales_with_implied_interest() {
        let state = pool(dec!(0.1));
        let quote = PricingModel::Hyperdrive
            .quote_open_long(&state, &duration(), dec!(1_000_000))
            .unwrap();
        let expected = dec!(0.1) * (Decimal::ONE - quote.spot_price) * quote.curve_bonds * quote.spot_price;
        assert_eq!(quote.curve_fee, expected);
        assert!(quote.curve_fee > Decimal::ZERO);
    }

    #[test]
    fn test_sell_bonds_inverts_open_long() {
        let mut state = pool(Decimal::ZERO);
        let quote = PricingModel::Hyperdrive
            .quote_open_long(&state, &duration(), dec!(1_000_000))
            .unwrap();
        state.share_reserves += quote.curve_shares;
        state.bond_reserves -= quote.curve_bonds;
        let back = PricingModel::Hyperdrive
            .quote_sell_bonds(&state, &duration(), Decimal::ONE, quote.curve_bonds)
            .unwrap();
        assert!(close_enough(back.curve_shares, quote.curve_shares, dec!(0.0001)));
    }

    #[test]
    fn test_hyperdrive_splits_by_time_remaining() {
        let state = pool(Decimal::ZERO);
        let quote = PricingModel::Hyperdrive
            .quote_sell_bonds(&state, &duration(), dec!(0.25), dec!(1000))
            .unwrap();
        assert_eq!(quote.flat_bonds, dec!(750));
        assert_eq!(quote.curve_bonds, dec!(250));
        assert_eq!(quote.flat_shares, dec!(750));
    }

    #[test]
    fn test_yieldspace_matured_trade_is_one_to_one() {
        let state = pool(dec!(0.1));
        let quote = PricingModel::YieldSpace
            .quote_sell_bonds(&state, &duration(), Decimal::ZERO, dec!(1000))
            .unwrap();
        assert_eq!(quote.flat_bonds, Decimal::ZERO);
        assert!(close_enough(quote.curve_shares, dec!(1000), dec!(0.0001)));
        assert_eq!(quote.spot_price, Decimal::ONE);
        assert_eq!(quote.total_fee(), Decimal::ZERO);
    }

    #[test]
    fn test_buy_bonds_costs_more_than_sell_returns() {
        let state = pool(Decimal::ZERO);
        let sell = PricingModel::Hyperdrive
            .quote_sell_bonds(&state, &duration(), Decimal::ONE, dec!(100_000))
            .unwrap();
        let buy = PricingModel::Hyperdrive
            .quote_buy_bonds(&state, &duration(), Decimal::ONE, dec!(100_000))
            .unwrap();
        assert!(buy.curve_shares > sell.curve_shares);
    }

    #[test]
    fn test_oversized_trades_fail() {
        let state = pool(Decimal::ZERO);
        let err = PricingModel::Hyperdrive
            .quote_sell_bonds(&state, &duration(), Decimal::ONE, dec!(1_000_000_000_000))
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientLiquidity(_)));
        let err = PricingModel::Hyperdrive
            .quote_buy_bonds(&state, &duration(), Decimal::ONE, state.bond_reserves)
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientLiquidity(_)));
    }

    #[test]
    fn test_scale_bonds_keeps_ratio() {
        let d_bonds = scale_bonds_with_shares(dec!(100), dec!(300), dec!(-10));
        assert_eq!(d_bonds, dec!(-30));
        assert_eq!(scale_bonds_with_shares(Decimal::ZERO, dec!(300), dec!(5)), Decimal::ZERO);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(PricingModel::YieldSpace.to_string(), "YieldSpace");
        assert_eq!(PricingModel::default().to_string(), "Hyperdrive");
    }
}
