//! Pool ledger and the additive deltas that mutate it.
//!
//! `MarketState` is only ever changed through [`MarketState::apply_delta`]
//! (trades, interest) or the checkpoint subsystem, which itself routes its
//! reserve changes through `apply_delta`. Both validate the candidate state
//! before committing, so a failed mutation leaves the ledger untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{AddAssign, Neg};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::errors::MarketError;
use super::time::{SECONDS_PER_DAY, align_to_checkpoint};

/// Slack allowed when comparing buffers against reserves, absorbing
/// `Decimal` rounding in share/base conversions.
const BUFFER_TOLERANCE: Decimal = dec!(0.000000001);

// ────────────────────────────────────────────
// Checkpoints and maturity buckets
// ────────────────────────────────────────────

/// Snapshot recorded once per aligned checkpoint timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Share price in effect when the checkpoint was recorded. Immutable.
    pub share_price: Decimal,
    /// Block time at which the checkpoint was recorded.
    pub recorded_at: u64,
    /// Long face value that matured at this timestamp.
    pub matured_longs: Decimal,
    /// Short face value that matured at this timestamp.
    pub matured_shorts: Decimal,
}

/// Open interest sharing one maturity time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturityBucket {
    pub longs: Decimal,
    pub shorts: Decimal,
    pub long_base_volume: Decimal,
    pub short_base_volume: Decimal,
}

impl MaturityBucket {
    pub fn is_empty(&self) -> bool {
        self.longs.is_zero()
            && self.shorts.is_zero()
            && self.long_base_volume.is_zero()
            && self.short_base_volume.is_zero()
    }
}

impl AddAssign for MaturityBucket {
    fn add_assign(&mut self, rhs: Self) {
        self.longs += rhs.longs;
        self.shorts += rhs.shorts;
        self.long_base_volume += rhs.long_base_volume;
        self.short_base_volume += rhs.short_base_volume;
    }
}

impl Neg for MaturityBucket {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            longs: -self.longs,
            shorts: -self.shorts,
            long_base_volume: -self.long_base_volume,
            short_base_volume: -self.short_base_volume,
        }
    }
}

// ────────────────────────────────────────────
// Deltas
// ────────────────────────────────────────────

/// Additive change to every field of [`MarketState`]. Zero by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDeltas {
    pub d_share_reserves: Decimal,
    pub d_bond_reserves: Decimal,
    pub d_lp_total_supply: Decimal,
    pub d_base_buffer: Decimal,
    pub d_bond_buffer: Decimal,
    pub d_share_price: Decimal,
    pub d_longs_outstanding: Decimal,
    pub d_shorts_outstanding: Decimal,
    pub d_long_average_maturity_time: Decimal,
    pub d_short_average_maturity_time: Decimal,
    pub d_long_base_volume: Decimal,
    pub d_short_base_volume: Decimal,
    pub d_long_withdrawal_shares_outstanding: Decimal,
    pub d_short_withdrawal_shares_outstanding: Decimal,
    pub d_long_withdrawal_share_proceeds: Decimal,
    pub d_short_withdrawal_share_proceeds: Decimal,
    /// Per-maturity change to open interest, keyed by maturity time.
    pub d_open_positions: BTreeMap<u64, MaturityBucket>,
}

impl MarketDeltas {
    /// Add `bucket` to the open-interest change at `maturity`.
    pub fn add_position(&mut self, maturity: u64, bucket: MaturityBucket) {
        *self.d_open_positions.entry(maturity).or_default() += bucket;
    }

    fn scalar_fields(&self) -> [(&'static str, Decimal); 16] {
        [
            ("d_share_reserves", self.d_share_reserves),
            ("d_bond_reserves", self.d_bond_reserves),
            ("d_lp_total_supply", self.d_lp_total_supply),
            ("d_base_buffer", self.d_base_buffer),
            ("d_bond_buffer", self.d_bond_buffer),
            ("d_share_price", self.d_share_price),
            ("d_longs_outstanding", self.d_longs_outstanding),
            ("d_shorts_outstanding", self.d_shorts_outstanding),
            ("d_long_average_maturity_time", self.d_long_average_maturity_time),
            ("d_short_average_maturity_time", self.d_short_average_maturity_time),
            ("d_long_base_volume", self.d_long_base_volume),
            ("d_short_base_volume", self.d_short_base_volume),
            ("d_long_withdrawal_shares_outstanding", self.d_long_withdrawal_shares_outstanding),
            ("d_short_withdrawal_shares_outstanding", self.d_short_withdrawal_shares_outstanding),
            ("d_long_withdrawal_share_proceeds", self.d_long_withdrawal_share_proceeds),
            ("d_short_withdrawal_share_proceeds", self.d_short_withdrawal_share_proceeds),
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.scalar_fields().iter().all(|(_, v)| v.is_zero())
            && self.d_open_positions.values().all(MaturityBucket::is_empty)
    }
}

impl AddAssign<&Self> for MarketDeltas {
    fn add_assign(&mut self, rhs: &Self) {
        self.d_share_reserves += rhs.d_share_reserves;
        self.d_bond_reserves += rhs.d_bond_reserves;
        self.d_lp_total_supply += rhs.d_lp_total_supply;
        self.d_base_buffer += rhs.d_base_buffer;
        self.d_bond_buffer += rhs.d_bond_buffer;
        self.d_share_price += rhs.d_share_price;
        self.d_longs_outstanding += rhs.d_longs_outstanding;
        self.d_shorts_outstanding += rhs.d_shorts_outstanding;
        self.d_long_average_maturity_time += rhs.d_long_average_maturity_time;
        self.d_short_average_maturity_time += rhs.d_short_average_maturity_time;
        self.d_long_base_volume += rhs.d_long_base_volume;
        self.d_short_base_volume += rhs.d_short_base_volume;
        self.d_long_withdrawal_shares_outstanding += rhs.d_long_withdrawal_shares_outstanding;
        self.d_short_withdrawal_shares_outstanding += rhs.d_short_withdrawal_shares_outstanding;
        self.d_long_withdrawal_share_proceeds += rhs.d_long_withdrawal_share_proceeds;
        self.d_short_withdrawal_share_proceeds += rhs.d_short_withdrawal_share_proceeds;
        for (maturity, bucket) in &rhs.d_open_positions {
            self.add_position(*maturity, *bucket);
        }
    }
}

impl fmt::Display for MarketDeltas {
    /// Only non-zero fields are printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .scalar_fields()
            .iter()
            .filter(|(_, v)| !v.is_zero())
            .map(|(name, v)| format!("{name}={v}"))
            .collect();
        for (maturity, bucket) in &self.d_open_positions {
            if !bucket.is_empty() {
                parts.push(format!(
                    "d_open_positions[{maturity}]=(longs={}, shorts={})",
                    bucket.longs, bucket.shorts
                ));
            }
        }
        write!(f, "MarketDeltas({})", parts.join(", "))
    }
}

// ────────────────────────────────────────────
// Market state
// ────────────────────────────────────────────

/// The mutable ledger of one pool.
///
/// Units: `share_reserves` in shares; `bond_reserves`, buffers, outstanding
/// positions and withdrawal shares in bonds (face value, base at maturity);
/// volumes and withdrawal proceeds in base; times in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    pub share_reserves: Decimal,
    pub bond_reserves: Decimal,
    pub lp_total_supply: Decimal,

    pub base_buffer: Decimal,
    pub bond_buffer: Decimal,

    pub variable_apr: Decimal,
    pub share_price: Decimal,
    pub init_share_price: Decimal,

    pub trade_fee_percent: Decimal,
    pub redemption_fee_percent: Decimal,

    pub longs_outstanding: Decimal,
    pub shorts_outstanding: Decimal,
    pub long_average_maturity_time: Decimal,
    pub short_average_maturity_time: Decimal,
    pub long_base_volume: Decimal,
    pub short_base_volume: Decimal,

    pub long_withdrawal_shares_outstanding: Decimal,
    pub short_withdrawal_shares_outstanding: Decimal,
    pub long_withdrawal_share_proceeds: Decimal,
    pub short_withdrawal_share_proceeds: Decimal,

    pub checkpoint_duration: u64,
    pub checkpoints: BTreeMap<u64, Checkpoint>,
    pub open_positions: BTreeMap<u64, MaturityBucket>,
}

impl Default for MarketState {
    fn default() -> Self {
        Self {
            share_reserves: Decimal::ZERO,
            bond_reserves: Decimal::ZERO,
            lp_total_supply: Decimal::ZERO,
            base_buffer: Decimal::ZERO,
            bond_buffer: Decimal::ZERO,
            variable_apr: Decimal::ZERO,
            share_price: Decimal::ONE,
            init_share_price: Decimal::ONE,
            trade_fee_percent: Decimal::ZERO,
            redemption_fee_percent: Decimal::ZERO,
            longs_outstanding: Decimal::ZERO,
            shorts_outstanding: Decimal::ZERO,
            long_average_maturity_time: Decimal::ZERO,
            short_average_maturity_time: Decimal::ZERO,
            long_base_volume: Decimal::ZERO,
            short_base_volume: Decimal::ZERO,
            long_withdrawal_shares_outstanding: Decimal::ZERO,
            short_withdrawal_shares_outstanding: Decimal::ZERO,
            long_withdrawal_share_proceeds: Decimal::ZERO,
            short_withdrawal_share_proceeds: Decimal::ZERO,
            checkpoint_duration: SECONDS_PER_DAY,
            checkpoints: BTreeMap::new(),
            open_positions: BTreeMap::new(),
        }
    }
}

impl MarketState {
    /// A market is initialized once either reserve is non-zero.
    pub fn is_initialized(&self) -> bool {
        !self.share_reserves.is_zero() || !self.bond_reserves.is_zero()
    }

    /// Base in the pool not reserved against open longs.
    pub fn idle_base(&self) -> Decimal {
        self.share_reserves * self.share_price - self.base_buffer
    }

    /// Face value of open shorts not yet owed to withdrawal shares. It comes
    /// back into share reserves as those shorts close or mature.
    pub fn locked_short_base(&self) -> Decimal {
        (self.shorts_outstanding - self.short_withdrawal_shares_outstanding).max(Decimal::ZERO)
    }

    /// Base value behind the LP tokens still in circulation.
    ///
    /// Long buffers settle at face, so nothing locked behind longs returns
    /// to LPs; only short capital counts on top of idle base.
    pub fn lp_pool_value(&self) -> Decimal {
        self.idle_base() + self.locked_short_base()
    }

    pub fn total_withdrawal_shares(&self) -> Decimal {
        self.long_withdrawal_shares_outstanding + self.short_withdrawal_shares_outstanding
    }

    pub fn latest_checkpoint_time(&self, block_time: u64) -> u64 {
        align_to_checkpoint(block_time, self.checkpoint_duration)
    }

    /// Open interest maturing at `maturity`, zero when none.
    pub fn bucket(&self, maturity: u64) -> MaturityBucket {
        self.open_positions.get(&maturity).copied().unwrap_or_default()
    }

    /// Add `delta` to every field, committing only if the result is valid.
    pub fn apply_delta(&mut self, delta: &MarketDeltas) -> Result<(), MarketError> {
        let mut candidate = self.clone();
        candidate.accumulate(delta);
        candidate.check_invariants()?;
        *self = candidate;
        Ok(())
    }

    fn accumulate(&mut self, d: &MarketDeltas) {
        self.share_reserves += d.d_share_reserves;
        self.bond_reserves += d.d_bond_reserves;
        self.lp_total_supply += d.d_lp_total_supply;
        self.base_buffer += d.d_base_buffer;
        self.bond_buffer += d.d_bond_buffer;
        self.share_price += d.d_share_price;
        self.longs_outstanding += d.d_longs_outstanding;
        self.shorts_outstanding += d.d_shorts_outstanding;
        self.long_average_maturity_time += d.d_long_average_maturity_time;
        self.short_average_maturity_time += d.d_short_average_maturity_time;
        self.long_base_volume += d.d_long_base_volume;
        self.short_base_volume += d.d_short_base_volume;
        self.long_withdrawal_shares_outstanding += d.d_long_withdrawal_shares_outstanding;
        self.short_withdrawal_shares_outstanding += d.d_short_withdrawal_shares_outstanding;
        self.long_withdrawal_share_proceeds += d.d_long_withdrawal_share_proceeds;
        self.short_withdrawal_share_proceeds += d.d_short_withdrawal_share_proceeds;
        for (maturity, change) in &d.d_open_positions {
            let emptied = {
                let bucket = self.open_positions.entry(*maturity).or_default();
                *bucket += *change;
                bucket.is_empty()
            };
            if emptied {
                self.open_positions.remove(maturity);
            }
        }
    }

    /// Validate the ledger's structural invariants.
    pub fn check_invariants(&self) -> Result<(), MarketError> {
        let non_negative = [
            ("share_reserves", self.share_reserves),
            ("bond_reserves", self.bond_reserves),
            ("lp_total_supply", self.lp_total_supply),
            ("base_buffer", self.base_buffer),
            ("bond_buffer", self.bond_buffer),
            ("longs_outstanding", self.longs_outstanding),
            ("shorts_outstanding", self.shorts_outstanding),
            ("long_withdrawal_shares_outstanding", self.long_withdrawal_shares_outstanding),
            ("short_withdrawal_shares_outstanding", self.short_withdrawal_shares_outstanding),
            ("long_withdrawal_share_proceeds", self.long_withdrawal_share_proceeds),
            ("short_withdrawal_share_proceeds", self.short_withdrawal_share_proceeds),
        ];
        for (name, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(MarketError::InvariantViolation(format!(
                    "{name} is negative: {value}"
                )));
            }
        }
        if self.share_price <= Decimal::ZERO {
            return Err(MarketError::InvariantViolation(format!(
                "share price must be positive, got {}",
                self.share_price
            )));
        }
        let reserves_in_base = self.share_reserves * self.share_price;
        if self.base_buffer > reserves_in_base + BUFFER_TOLERANCE {
            return Err(MarketError::InvariantViolation(format!(
                "base buffer {} exceeds share reserves worth {reserves_in_base}",
                self.base_buffer
            )));
        }
        if self.bond_buffer > self.bond_reserves + BUFFER_TOLERANCE {
            return Err(MarketError::InvariantViolation(format!(
                "bond buffer {} exceeds bond reserves {}",
                self.bond_buffer, self.bond_reserves
            )));
        }
        for (maturity, bucket) in &self.open_positions {
            if bucket.longs < Decimal::ZERO || bucket.shorts < Decimal::ZERO {
                return Err(MarketError::InvariantViolation(format!(
                    "negative open interest at maturity {maturity}"
                )));
            }
        }
        if self.checkpoint_duration > 0 {
            if let Some(time) = self
                .checkpoints
                .keys()
                .find(|time| *time % self.checkpoint_duration != 0)
            {
                return Err(MarketError::InvariantViolation(format!(
                    "checkpoint {time} is not aligned to {}",
                    self.checkpoint_duration
                )));
            }
        }
        Ok(())
    }
}

/// Weighted average of `average` over `total` after adding or removing
/// `amount` at `value`. Returns zero once the total is exhausted.
pub fn update_weighted_average(
    average: Decimal,
    total: Decimal,
    value: Decimal,
    amount: Decimal,
    is_adding: bool,
) -> Decimal {
    if is_adding {
        if total.is_zero() {
            return value;
        }
        let new_total = total + amount;
        if new_total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (average * total + value * amount) / new_total
    } else {
        let new_total = total - amount;
        if new_total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (average * total - value * amount) / new_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded() -> MarketState {
        MarketState {
            share_reserves: dec!(1000),
            bond_reserves: dec!(1100),
            lp_total_supply: dec!(2100),
            ..MarketState::default()
        }
    }

    #[test]
    fn test_default_state_is_uninitialized() {
        let state = MarketState::default();
        assert!(!state.is_initialized());
        assert_eq!(state.share_price, Decimal::ONE);
        assert_eq!(state.checkpoint_duration, SECONDS_PER_DAY);
        assert!(funded().is_initialized());
    }

    #[test]
    fn test_apply_delta_accumulates() {
        let mut state = funded();
        let mut delta = MarketDeltas {
            d_share_reserves: dec!(100),
            d_bond_reserves: dec!(-105),
            d_base_buffer: dec!(105),
            d_longs_outstanding: dec!(105),
            ..MarketDeltas::default()
        };
        delta.add_position(
            SECONDS_PER_DAY,
            MaturityBucket { longs: dec!(105), long_base_volume: dec!(100), ..MaturityBucket::default() },
        );
        state.apply_delta(&delta).unwrap();
        assert_eq!(state.share_reserves, dec!(1100));
        assert_eq!(state.bond_reserves, dec!(995));
        assert_eq!(state.longs_outstanding, dec!(105));
        assert_eq!(state.bucket(SECONDS_PER_DAY).longs, dec!(105));
    }

    #[test]
    fn test_rejected_delta_leaves_state_untouched() {
        let mut state = funded();
        let before = state.clone();
        let delta = MarketDeltas { d_share_reserves: dec!(-1001), ..MarketDeltas::default() };
        let err = state.apply_delta(&delta).unwrap_err();
        assert!(matches!(err, MarketError::InvariantViolation(_)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_base_buffer_cannot_exceed_reserves() {
        let mut state = funded();
        let delta = MarketDeltas { d_base_buffer: dec!(1500), ..MarketDeltas::default() };
        assert!(state.apply_delta(&delta).is_err());
        assert_eq!(state.base_buffer, Decimal::ZERO);
    }

    #[test]
    fn test_emptied_bucket_is_removed() {
        let mut state = funded();
        let bucket = MaturityBucket { shorts: dec!(10), ..MaturityBucket::default() };
        let mut open = MarketDeltas { d_bond_reserves: dec!(10), d_bond_buffer: dec!(10), ..MarketDeltas::default() };
        open.add_position(7 * SECONDS_PER_DAY, bucket);
        state.apply_delta(&open).unwrap();
        assert_eq!(state.open_positions.len(), 1);

        let mut close = MarketDeltas { d_bond_reserves: dec!(-10), d_bond_buffer: dec!(-10), ..MarketDeltas::default() };
        close.add_position(7 * SECONDS_PER_DAY, -bucket);
        state.apply_delta(&close).unwrap();
        assert!(state.open_positions.is_empty());
    }

    #[test]
    fn test_deltas_add_assign_merges_buckets() {
        let mut total = MarketDeltas { d_share_reserves: dec!(1), ..MarketDeltas::default() };
        let mut other = MarketDeltas { d_share_reserves: dec!(2), ..MarketDeltas::default() };
        other.add_position(0, MaturityBucket { longs: dec!(3), ..MaturityBucket::default() });
        total += &other;
        total += &other;
        assert_eq!(total.d_share_reserves, dec!(5));
        assert_eq!(total.d_open_positions[&0].longs, dec!(6));
        assert!(!total.is_zero());
        assert!(MarketDeltas::default().is_zero());
    }

    #[test]
    fn test_deltas_display_skips_zero_fields() {
        let delta = MarketDeltas { d_bond_buffer: dec!(4), ..MarketDeltas::default() };
        assert_eq!(delta.to_string(), "MarketDeltas(d_bond_buffer=4)");
    }

    #[test]
    fn test_weighted_average() {
        let avg = update_weighted_average(dec!(100), dec!(10), dec!(200), dec!(10), true);
        assert_eq!(avg, dec!(150));
        let avg = update_weighted_average(avg, dec!(20), dec!(200), dec!(10), false);
        assert_eq!(avg, dec!(100));
        assert_eq!(update_weighted_average(avg, dec!(10), dec!(100), dec!(10), false), Decimal::ZERO);
    }

    #[test]
    fn test_idle_base() {
        let state = MarketState { base_buffer: dec!(400), share_price: dec!(1.5), ..funded() };
        assert_eq!(state.idle_base(), dec!(1100));
    }

    #[test]
    fn test_lp_pool_value_counts_unclaimed_short_capital() {
        let state = MarketState {
            shorts_outstanding: dec!(300),
            short_withdrawal_shares_outstanding: dec!(100),
            base_buffer: dec!(400),
            ..funded()
        };
        assert_eq!(state.locked_short_base(), dec!(200));
        assert_eq!(state.lp_pool_value(), state.idle_base() + dec!(200));

        let overclaimed = MarketState { short_withdrawal_shares_outstanding: dec!(500), ..state };
        assert_eq!(overclaimed.locked_short_base(), Decimal::ZERO);
        assert_eq!(overclaimed.lp_pool_value(), overclaimed.idle_base());
    }
}
