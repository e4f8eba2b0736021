//! Block time and stretched position time.
//!
//! Block time is carried as integer seconds so checkpoint alignment and
//! key equality are exact. Position lengths are carried in days as
//! `Decimal` and converted to the stretched exponent the curve uses.

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::errors::MarketError;

pub const SECONDS_PER_DAY: u64 = 86_400;
pub const DAYS_PER_YEAR: Decimal = dec!(365);
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Simulated chain clock.
///
/// Interior mutability lets the driver advance time through a shared
/// handle while the market only ever reads it.
#[derive(Debug)]
pub struct BlockTime {
    time: AtomicU64,
    block_number: AtomicU64,
    seconds_per_block: u64,
}

impl BlockTime {
    pub fn new(start_time: u64, seconds_per_block: u64) -> Self {
        Self {
            time: AtomicU64::new(start_time),
            block_number: AtomicU64::new(0),
            seconds_per_block,
        }
    }

    /// Current block timestamp in seconds.
    pub fn time(&self) -> u64 {
        self.time.load(Ordering::Relaxed)
    }

    pub fn block_number(&self) -> u64 {
        self.block_number.load(Ordering::Relaxed)
    }

    pub fn seconds_per_block(&self) -> u64 {
        self.seconds_per_block
    }

    /// Advance the clock by `seconds` without minting a block.
    pub fn tick(&self, seconds: u64) {
        self.time.fetch_add(seconds, Ordering::Relaxed);
    }

    /// Mint one block and advance the clock by the block interval.
    pub fn step(&self) {
        self.block_number.fetch_add(1, Ordering::Relaxed);
        self.tick(self.seconds_per_block);
    }
}

impl Default for BlockTime {
    fn default() -> Self {
        Self::new(0, 12)
    }
}

/// A span of days expressed in the curve's stretched time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StretchedTime {
    days: Decimal,
    time_stretch: Decimal,
    normalizing_constant: Decimal,
}

impl StretchedTime {
    pub fn new(days: Decimal, time_stretch: Decimal, normalizing_constant: Decimal) -> Self {
        Self {
            days,
            time_stretch,
            normalizing_constant,
        }
    }

    pub fn days(&self) -> Decimal {
        self.days
    }

    pub fn time_stretch(&self) -> Decimal {
        self.time_stretch
    }

    pub fn normalizing_constant(&self) -> Decimal {
        self.normalizing_constant
    }

    /// Days as a fraction of the normalizing constant.
    pub fn normalized_time(&self) -> Decimal {
        self.days / self.normalizing_constant
    }

    /// The curve exponent `t`: normalized time divided by the time stretch.
    pub fn stretched_time(&self) -> Decimal {
        self.normalized_time() / self.time_stretch
    }

    /// Days expressed in years.
    pub fn annualized_time(&self) -> Decimal {
        self.days / DAYS_PER_YEAR
    }
}

/// Nominal position length. Frozen once built.
///
/// The normalizing constant must equal the day count so a fresh position
/// has a normalized time of exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDuration(StretchedTime);

impl PositionDuration {
    pub fn new(
        days: Decimal,
        time_stretch: Decimal,
        normalizing_constant: Decimal,
    ) -> Result<Self, MarketError> {
        if days != normalizing_constant {
            return Err(MarketError::InvalidPositionDuration(format!(
                "term length of {days} days should normalize to 1, got normalizing constant {normalizing_constant}"
            )));
        }
        if days <= Decimal::ZERO || !days.fract().is_zero() {
            return Err(MarketError::InvalidPositionDuration(format!(
                "term length must be a positive whole number of days, got {days}"
            )));
        }
        if time_stretch <= Decimal::ZERO {
            return Err(MarketError::InvalidPositionDuration(format!(
                "time stretch must be positive, got {time_stretch}"
            )));
        }
        Ok(Self(StretchedTime::new(days, time_stretch, normalizing_constant)))
    }

    /// Build a duration whose time stretch is derived from the target rate.
    pub fn from_target_apr(days: Decimal, target_apr: Decimal) -> Result<Self, MarketError> {
        let time_stretch = super::pricing::calc_time_stretch(target_apr)?;
        Self::new(days, time_stretch, days)
    }

    pub fn days(&self) -> Decimal {
        self.0.days()
    }

    pub fn time_stretch(&self) -> Decimal {
        self.0.time_stretch()
    }

    pub fn stretched_time(&self) -> Decimal {
        self.0.stretched_time()
    }

    pub fn as_stretched_time(&self) -> StretchedTime {
        self.0
    }

    /// Position length in years.
    pub fn annualized_time(&self) -> Decimal {
        self.0.annualized_time()
    }

    /// Position length in seconds.
    pub fn seconds(&self) -> u64 {
        // Whole days are enforced at construction.
        self.0.days().to_u64().unwrap_or(0) * SECONDS_PER_DAY
    }

    /// The stretched time left on a position given the normalized fraction remaining.
    pub fn time_remaining(&self, normalized_remaining: Decimal) -> StretchedTime {
        StretchedTime::new(
            self.0.days() * normalized_remaining,
            self.0.time_stretch(),
            self.0.normalizing_constant(),
        )
    }

    /// Fraction of the term left on a position minted at `mint_time`, measured
    /// at checkpoint granularity and clamped to `[0, 1]`.
    pub fn normalized_time_remaining(&self, mint_time: u64, checkpoint_time: u64) -> Decimal {
        let elapsed = checkpoint_time.saturating_sub(mint_time);
        let term = self.seconds();
        if term == 0 || elapsed >= term {
            return Decimal::ZERO;
        }
        Decimal::ONE - Decimal::from(elapsed) / Decimal::from(term)
    }
}

/// Align a timestamp down to its checkpoint boundary.
pub fn align_to_checkpoint(time: u64, checkpoint_duration: u64) -> u64 {
    if checkpoint_duration == 0 {
        return time;
    }
    time - time % checkpoint_duration
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year() -> PositionDuration {
        PositionDuration::new(dec!(365), dec!(22.186877016851916), dec!(365)).unwrap()
    }

    #[test]
    fn test_block_time_step_and_tick() {
        let clock = BlockTime::new(0, 12);
        clock.step();
        clock.step();
        assert_eq!(clock.block_number(), 2);
        assert_eq!(clock.time(), 24);
        clock.tick(SECONDS_PER_DAY);
        assert_eq!(clock.time(), 24 + SECONDS_PER_DAY);
        assert_eq!(clock.block_number(), 2);
    }

    #[test]
    fn test_position_duration_requires_normalized_term() {
        let err = PositionDuration::new(dec!(365), dec!(22), dec!(180)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidPositionDuration(_)));
    }

    #[test]
    fn test_position_duration_rejects_fractional_days() {
        assert!(PositionDuration::new(dec!(90.5), dec!(22), dec!(90.5)).is_err());
        assert!(PositionDuration::new(dec!(0), dec!(22), dec!(0)).is_err());
    }

    #[test]
    fn test_stretched_time_of_full_term() {
        let duration = year();
        assert_eq!(duration.as_stretched_time().normalized_time(), Decimal::ONE);
        assert_eq!(duration.stretched_time(), Decimal::ONE / dec!(22.186877016851916));
        assert_eq!(duration.annualized_time(), Decimal::ONE);
        assert_eq!(duration.seconds(), 365 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_duration_seconds_with_scaled_days() {
        let duration = PositionDuration::new(dec!(90.0), dec!(10), dec!(90.0)).unwrap();
        assert_eq!(duration.seconds(), 90 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_normalized_time_remaining() {
        let duration = year();
        let mint = 10 * SECONDS_PER_DAY;
        assert_eq!(duration.normalized_time_remaining(mint, mint), Decimal::ONE);
        let half = mint + duration.seconds() / 2;
        assert!((duration.normalized_time_remaining(mint, half) - dec!(0.5)).abs() < dec!(0.0000001));
        assert_eq!(duration.normalized_time_remaining(mint, mint + duration.seconds()), Decimal::ZERO);
        assert_eq!(duration.normalized_time_remaining(mint, mint + 2 * duration.seconds()), Decimal::ZERO);
    }

    #[test]
    fn test_align_to_checkpoint() {
        assert_eq!(align_to_checkpoint(86_399, SECONDS_PER_DAY), 0);
        assert_eq!(align_to_checkpoint(86_400, SECONDS_PER_DAY), 86_400);
        assert_eq!(align_to_checkpoint(200_000, SECONDS_PER_DAY), 172_800);
    }
}
