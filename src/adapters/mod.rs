//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure. The engine itself is pure; the only outside concern
//! a simulation run has is where its results land.
//!
//! Adapter categories:
//! - `persistence`: JSONL trade logging and market snapshots

pub mod persistence;
