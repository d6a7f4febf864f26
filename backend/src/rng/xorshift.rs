//! xorshift64* random number generator
//!
//! Fast, deterministic PRNG used for every random draw in the simulation.
//! Same seed and same module registration order gives the same run, which is
//! what makes a scenario reproducible for debugging and policy comparison.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use health_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let draw = rng.next_f64();
/// assert!((0.0..1.0).contains(&draw));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit, never zero)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    pub fn new(seed: u64) -> Self {
        // xorshift state must never be zero
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Random value in `[min, max)`
    ///
    /// # Panics
    /// Panics if `min >= max`
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");
        let range_size = max.abs_diff(min);
        min.wrapping_add((self.next() % range_size) as i64)
    }

    /// Random f64 in `[0.0, 1.0)`
    pub fn next_f64(&mut self) -> f64 {
        (self.next() >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// True with probability `p` (clamped to `[0, 1]`)
    pub fn bernoulli(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        self.next_f64() < p.min(1.0)
    }

    /// Standard normal draw (Box-Muller, one value per call)
    pub fn normal(&mut self) -> f64 {
        // 1 - u keeps the log argument in (0, 1]
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    /// Current RNG state (for snapshots and digests)
    pub fn get_state(&self) -> u64 {
        self.state
    }
}
