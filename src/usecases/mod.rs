//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the engine's workflows.
//!
//! Use cases:
//! - `Market`: Trade validation, implicit checkpoints, delta application
//! - `Simulation`: Block-stepping replay of a scripted trade schedule

pub mod market;
pub mod simulation;

pub use market::Market;
pub use simulation::{ScheduledTrade, Simulation, SimulationReport};
