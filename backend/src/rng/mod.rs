//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm. All randomness in the simulator goes
//! through this module, so a run is reproducible from its seed.

mod xorshift;

pub use xorshift::RngManager;
