//! Orchestrator - main simulation loop
//!
//! See `engine.rs` for the day loop and `checkpoint.rs` for snapshots.

pub mod checkpoint;
pub mod engine;

// Re-export main types for convenience
pub use engine::{RunSummary, Simulation, SimulationConfig, SimulationError};

// Re-export checkpoint types
pub use checkpoint::{compute_digest, ColumnSnapshot, PopulationSnapshot};
