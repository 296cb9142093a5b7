//! Uniform probability source used for probabilistic admission.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of independent draws in `[0, 1)`.
pub trait Probability: Send + Sync {
    fn draw(&self) -> f64;

    /// Returns `true` with probability `p`.
    fn true_on(&self, p: f64) -> bool {
        self.draw() < p
    }
}

/// [`Probability`] backed by a [`StdRng`] behind a lock.
pub struct RandomProbability {
    rng: Mutex<StdRng>,
}

impl RandomProbability {
    /// Seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence, for reproducible tests and simulations.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomProbability {
    fn default() -> Self {
        Self::new()
    }
}

impl Probability for RandomProbability {
    fn draw(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

/// Always draws the same value. `FixedProbability(0.0)` rejects whenever the
/// drop ratio is positive; `FixedProbability(1.0)` never rejects.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbability(pub f64);

impl Probability for FixedProbability {
    fn draw(&self) -> f64 {
        self.0
    }
}
