//! Deterministic RNG hierarchy.
//!
//! A master seed generates a sub-seed for each `(signal type, suggestion,
//! perturbation)` tuple. Sub-seeds are derived via BLAKE3 hashing, so they do
//! not depend on evaluation order or thread scheduling.

use crate::domain::SignalType;
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

    /// Derive the sub-seed for one perturbation of one suggestion.
    pub fn sub_seed(&self, signal_type: SignalType, suggestion: u64, perturbation: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(signal_type.as_str().as_bytes());
        hasher.update(&suggestion.to_le_bytes());
        hasher.update(&perturbation.to_le_bytes());
        let hash = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(seed)
    }

    /// Seeded StdRng for a sub-seed.
    pub fn rng_for(&self, signal_type: SignalType, suggestion: u64, perturbation: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(signal_type, suggestion, perturbation))
    }
}
