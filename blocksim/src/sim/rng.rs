//! Run-scoped deterministic random number generation.
//!
//! Every [`Environment`](super::Environment) owns exactly one `SimRng`,
//! seeded when the environment is created. Policies draw from it through the
//! environment, so two runs with the same seed and the same inputs observe
//! the same sequence of values.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded ChaCha8 generator with call accounting.
#[derive(Debug, Clone)]
pub struct SimRng {
    rng: ChaCha8Rng,
    seed: u64,
    calls: u64,
}

impl SimRng {
    /// Create a generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            calls: 0,
        }
    }

    /// The seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of values drawn since creation.
    pub fn call_count(&self) -> u64 {
        self.calls
    }

    /// Generate a random f64 in the range [0.0, 1.0).
    pub fn random_f64(&mut self) -> f64 {
        self.calls += 1;
        self.rng.random::<f64>()
    }
}
