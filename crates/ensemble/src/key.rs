//! Explicit, splittable pseudo-random keys.
//!
//! Every stochastic operation takes a `PrngKey` by value and callers split a
//! fresh key for each use, so no generator state is shared between calls.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// A 64-bit seed that can be split deterministically into child keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PrngKey(u64);

impl PrngKey {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Split into two independent child keys.
    pub fn split(self) -> (PrngKey, PrngKey) {
        let mut rng = self.rng();
        (PrngKey(rng.gen()), PrngKey(rng.gen()))
    }

    /// Split into `n` independent child keys.
    pub fn split_n(self, n: usize) -> Vec<PrngKey> {
        let mut rng = self.rng();
        (0..n).map(|_| PrngKey(rng.gen())).collect()
    }

    /// Generator seeded from this key.
    pub fn rng(self) -> StdRng {
        StdRng::seed_from_u64(self.0)
    }

    /// Draw `n` samples from the standard normal distribution.
    pub fn standard_normal(self, n: usize) -> Vec<f32> {
        let mut rng = self.rng();
        (0..n).map(|_| rng.sample::<f32, _>(StandardNormal)).collect()
    }

    /// Draw `n` samples from a normal distribution truncated at two standard
    /// deviations, scaled by `std_dev`.
    pub fn truncated_normal(self, n: usize, std_dev: f64) -> Vec<f32> {
        let mut rng = self.rng();
        (0..n)
            .map(|_| loop {
                let x: f64 = rng.sample(StandardNormal);
                if x.abs() <= 2.0 {
                    break (x * std_dev) as f32;
                }
            })
            .collect()
    }
}
