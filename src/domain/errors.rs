//! Market engine error taxonomy.
//!
//! Every fallible engine operation returns `Result<_, MarketError>`.
//! Errors are local to the failing operation: the market is never left
//! partially mutated, and the caller decides whether a failure matters.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the pricing model, the action calculators, the
/// checkpoint subsystem and the market orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    // ── Usage errors (caller contract violated) ───────────────
    #[error("{action} requires a mint time")]
    MissingMintTime { action: &'static str },

    #[error("close_short requires the short's open share price")]
    MissingOpenSharePrice,

    #[error("initialize_market requires a target apr")]
    MissingTargetApr,

    #[error("unknown action type \"{0}\"")]
    UnknownActionType(String),

    #[error("the market appears to already be initialized")]
    AlreadyInitialized,

    #[error("the market has not been initialized")]
    NotInitialized,

    #[error("trade amount must be positive, got {0}")]
    InvalidTradeAmount(Decimal),

    #[error("insufficient {kind}: requested {requested}, held {held}")]
    InsufficientPosition {
        kind: &'static str,
        requested: Decimal,
        held: Decimal,
    },

    // ── Invalid-time errors ───────────────────────────────────
    #[error("invalid checkpoint time {checkpoint_time} (block time {block_time}, duration {checkpoint_duration})")]
    InvalidCheckpointTime {
        checkpoint_time: u64,
        block_time: u64,
        checkpoint_duration: u64,
    },

    #[error("invalid position duration: {0}")]
    InvalidPositionDuration(String),

    // ── Numerical domain errors ───────────────────────────────
    #[error("share reserves are empty; price is undefined")]
    EmptyReserves,

    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("trade would pay negative interest: {0}")]
    NegativeInterest(String),

    #[error("market invariant violated: {0}")]
    InvariantViolation(String),

    #[error("arithmetic failure: {0}")]
    Arithmetic(String),
}

impl MarketError {
    /// True for errors caused by a malformed request rather than market conditions.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::MissingMintTime { .. }
                | Self::MissingOpenSharePrice
                | Self::MissingTargetApr
                | Self::UnknownActionType(_)
                | Self::AlreadyInitialized
                | Self::NotInitialized
                | Self::InvalidTradeAmount(_)
                | Self::InsufficientPosition { .. }
        )
    }

    /// True for checkpoint and duration timing errors.
    pub fn is_time_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCheckpointTime { .. } | Self::InvalidPositionDuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_usage_classification() {
        assert!(MarketError::MissingMintTime { action: "close_long" }.is_usage_error());
        assert!(MarketError::AlreadyInitialized.is_usage_error());
        assert!(!MarketError::EmptyReserves.is_usage_error());
        assert!(!MarketError::InvalidTradeAmount(dec!(0)).is_time_error());
    }

    #[test]
    fn test_time_classification() {
        let err = MarketError::InvalidCheckpointTime {
            checkpoint_time: 90_000,
            block_time: 86_400,
            checkpoint_duration: 86_400,
        };
        assert!(err.is_time_error());
        assert!(!err.is_usage_error());
    }

    #[test]
    fn test_display_messages() {
        let err = MarketError::UnknownActionType("swap".to_string());
        assert_eq!(err.to_string(), "unknown action type \"swap\"");
        let err = MarketError::MissingMintTime { action: "close_short" };
        assert_eq!(err.to_string(), "close_short requires a mint time");
    }
}
