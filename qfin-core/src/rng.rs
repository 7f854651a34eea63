//! Deterministic seed hierarchy.
//!
//! A master seed drives window sampling directly and expands into per-fold
//! strategy seeds keyed by `(run fingerprint, fold)`. Sub-seeds are derived by
//! BLAKE3 hashing, so they do not depend on the order in which folds or sweep
//! entries are evaluated.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// RNG used for window sampling.
    pub fn window_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.master_seed)
    }

    /// Sub-seed for one fold of one run.
    pub fn fold_seed(&self, run_fingerprint: &str, fold: usize) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(run_fingerprint.as_bytes());
        hasher.update(&(fold as u64).to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}
