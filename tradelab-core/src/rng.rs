//! Deterministic RNG hierarchy for parameter search.
//!
//! A master seed yields one sub-seed per `(scope, window, trial)` tuple. Sub-seeds
//! come from BLAKE3, so they do not depend on the order in which windows or
//! trials are visited.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for `(scope, window, trial)`. `scope` separates independent
    /// consumers, e.g. "random" vs "adaptive".
    pub fn sub_seed(&self, scope: &str, window: usize, trial: usize) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(scope.as_bytes());
        hasher.update(&(window as u64).to_le_bytes());
        hasher.update(&(trial as u64).to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn rng_for(&self, scope: &str, window: usize, trial: usize) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(scope, window, trial))
    }
}
