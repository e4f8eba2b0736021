//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the market engine
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `TimeProvider`: Current block time
//! - `WalletLedger`: Agent balances keyed by position mint time
//! - `Repository`: Trade log and market snapshot persistence (JSONL-based)

pub mod clock;
pub mod repository;
pub mod wallet;

pub use clock::TimeProvider;
pub use repository::{MarketSnapshot, Repository, TradeRecord};
pub use wallet::WalletLedger;
