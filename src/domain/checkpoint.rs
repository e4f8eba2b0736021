//! Checkpoint recording and position maturation.
//!
//! A checkpoint moves from absent to recorded exactly once. Recording one
//! snapshots the share price and settles every bucket maturing at or before
//! its timestamp: matured longs are paid out of share reserves, matured
//! shorts pay in, and the buffers held against them are released.

use rust_decimal::Decimal;

use super::errors::MarketError;
use super::market_state::{Checkpoint, MarketDeltas, MarketState, MaturityBucket, update_weighted_average};
use super::pricing::scale_bonds_with_shares;

/// Reserve changes plus the checkpoint records a new checkpoint produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOutcome {
    pub deltas: MarketDeltas,
    pub checkpoints: Vec<(u64, Checkpoint)>,
    pub matured: Vec<(u64, MaturityBucket)>,
}

/// Reject checkpoints in the future or off the checkpoint grid.
pub fn validate_checkpoint_time(
    state: &MarketState,
    checkpoint_time: u64,
    block_time: u64,
) -> Result<(), MarketError> {
    let duration = state.checkpoint_duration;
    if duration == 0 || checkpoint_time % duration != 0 || checkpoint_time > block_time {
        return Err(MarketError::InvalidCheckpointTime {
            checkpoint_time,
            block_time,
            checkpoint_duration: duration,
        });
    }
    Ok(())
}

/// Share price a new checkpoint at `checkpoint_time` records.
///
/// A checkpoint behind an already recorded one inherits the price of the
/// nearest later checkpoint; otherwise the current share price is used.
pub fn checkpoint_share_price(state: &MarketState, checkpoint_time: u64) -> Decimal {
    state
        .checkpoints
        .range(checkpoint_time..)
        .next()
        .map_or(state.share_price, |(_, checkpoint)| checkpoint.share_price)
}

/// Portion of `released` capital owed to withdrawal-share holders.
pub(crate) fn withdrawal_credit(
    released: Decimal,
    withdrawal_shares: Decimal,
    outstanding: Decimal,
) -> Decimal {
    if released <= Decimal::ZERO
        || withdrawal_shares <= Decimal::ZERO
        || outstanding <= Decimal::ZERO
    {
        return Decimal::ZERO;
    }
    released * (withdrawal_shares / outstanding).min(Decimal::ONE)
}

/// Compute the effect of recording a checkpoint. `None` if it already exists.
pub fn calc_checkpoint(
    state: &MarketState,
    checkpoint_time: u64,
    block_time: u64,
) -> Result<Option<CheckpointOutcome>, MarketError> {
    validate_checkpoint_time(state, checkpoint_time, block_time)?;
    if state.checkpoints.contains_key(&checkpoint_time) {
        return Ok(None);
    }
    let share_price = checkpoint_share_price(state, checkpoint_time);

    let mut deltas = MarketDeltas::default();
    let mut d_shares = Decimal::ZERO;
    let mut longs = state.longs_outstanding;
    let mut shorts = state.shorts_outstanding;
    let mut long_average = state.long_average_maturity_time;
    let mut short_average = state.short_average_maturity_time;
    let mut matured = Vec::new();

    for (&maturity, bucket) in state.open_positions.range(..=checkpoint_time) {
        let maturity_time = Decimal::from(maturity);
        if bucket.longs > Decimal::ZERO {
            d_shares -= bucket.longs / share_price;
            deltas.d_base_buffer -= bucket.longs;
            deltas.d_longs_outstanding -= bucket.longs;
            long_average =
                update_weighted_average(long_average, longs, maturity_time, bucket.longs, false);
            longs -= bucket.longs;
        }
        if bucket.shorts > Decimal::ZERO {
            let credited = withdrawal_credit(
                bucket.shorts,
                state.short_withdrawal_shares_outstanding,
                shorts,
            );
            d_shares += (bucket.shorts - credited) / share_price;
            deltas.d_short_withdrawal_share_proceeds += credited;
            deltas.d_bond_buffer -= bucket.shorts;
            deltas.d_shorts_outstanding -= bucket.shorts;
            short_average =
                update_weighted_average(short_average, shorts, maturity_time, bucket.shorts, false);
            shorts -= bucket.shorts;
        }
        deltas.d_long_base_volume -= bucket.long_base_volume;
        deltas.d_short_base_volume -= bucket.short_base_volume;
        deltas.add_position(maturity, -*bucket);
        matured.push((maturity, *bucket));
    }

    deltas.d_long_average_maturity_time = long_average - state.long_average_maturity_time;
    deltas.d_short_average_maturity_time = short_average - state.short_average_maturity_time;
    deltas.d_share_reserves = d_shares;
    deltas.d_bond_reserves =
        scale_bonds_with_shares(state.share_reserves, state.bond_reserves, d_shares);

    let mut checkpoints = vec![(
        checkpoint_time,
        Checkpoint {
            share_price,
            recorded_at: block_time,
            ..Checkpoint::default()
        },
    )];
    for (maturity, bucket) in &matured {
        let record = if *maturity == checkpoint_time {
            &mut checkpoints[0].1
        } else if state.checkpoints.contains_key(maturity) {
            continue;
        } else {
            checkpoints.push((
                *maturity,
                Checkpoint {
                    share_price,
                    recorded_at: block_time,
                    ..Checkpoint::default()
                },
            ));
            let last = checkpoints.len() - 1;
            &mut checkpoints[last].1
        };
        record.matured_longs += bucket.longs;
        record.matured_shorts += bucket.shorts;
    }

    Ok(Some(CheckpointOutcome {
        deltas,
        checkpoints,
        matured,
    }))
}

impl MarketState {
    /// Record the checkpoint at `checkpoint_time` and mature due positions.
    ///
    /// Returns `false` when the checkpoint already existed.
    pub fn checkpoint(&mut self, checkpoint_time: u64, block_time: u64) -> Result<bool, MarketError> {
        let Some(outcome) = calc_checkpoint(self, checkpoint_time, block_time)? else {
            return Ok(false);
        };
        self.apply_delta(&outcome.deltas)?;
        for (time, record) in outcome.checkpoints {
            self.checkpoints.entry(time).or_insert(record);
        }
        Ok(true)
    }
}
