//! Hyperdrive Sim — Library Root
//!
//! Fixed-rate lending market engine: pool state, pricing, checkpoints,
//! trade calculators, and a block-stepping simulation driver.
//! Re-exports all modules for integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
