//! Domain layer - the market state engine.
//!
//! Pure logic for the fixed-rate pool: reserves ledger, pricing curve,
//! per-action delta calculators and the checkpoint subsystem.
//! No I/O here (hexagonal architecture inner ring).
//! All types are serializable and testable in isolation.

pub mod actions;
pub mod checkpoint;
pub mod errors;
pub mod market_state;
pub mod pricing;
pub mod time;
pub mod wallet;

// Re-export core types for convenience
pub use actions::{ActionContext, MarketAction, MarketActionType, TradeDeltas};
pub use checkpoint::CheckpointOutcome;
pub use errors::MarketError;
pub use market_state::{Checkpoint, MarketDeltas, MarketState, MaturityBucket};
pub use pricing::{PricingModel, TradeQuote};
pub use time::{BlockTime, PositionDuration, StretchedTime};
pub use wallet::{Long, Short, Wallet, WalletDeltas};
