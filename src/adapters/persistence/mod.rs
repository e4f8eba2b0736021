//! Persistence Adapters - Simulation Output on Disk
//!
//! `TradeLogger` appends every attempted trade of a run to its own JSONL
//! file; `StateStore` keeps the latest market snapshot as a single JSON
//! document replaced atomically. `RepositoryImpl` joins the two behind
//! the `Repository` port. No database dependency; a partial write loses
//! at most one line.

pub mod repository_impl;
pub mod state;
pub mod trades;

pub use repository_impl::RepositoryImpl;
pub use state::StateStore;
pub use trades::TradeLogger;
