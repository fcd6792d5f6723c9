//! Bounded random draws for schedule tuning knobs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::schedule::ScheduleParams;

/// Largest exponent drawn for a split width (`2^10 = 1024`).
pub const MAX_EXPONENT: u32 = 10;

/// Four nested exponents, `p1, p2 in [1, 10]`, `p3 in [1, p2]`, `p4 in [1, p3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exponents {
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
    pub p4: u32,
}

impl Exponents {
    /// Split widths `2^p` for each exponent.
    pub fn to_params(self) -> ScheduleParams {
        ScheduleParams::new(1 << self.p1, 1 << self.p2, 1 << self.p3, 1 << self.p4)
    }
}

/// Owned random stream used for schedule parameters and input seeds.
#[derive(Debug, Clone)]
pub struct ParamSampler {
    rng: StdRng,
}

impl ParamSampler {
    /// Sampler seeded from OS entropy; runs are not reproducible.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sampler.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform integer in `[0, bound]`.
    pub fn sample(&mut self, bound: u32) -> u32 {
        self.rng.gen_range(0..=bound)
    }

    /// Draw the four nested exponents, in order `p1, p2, p3, p4`.
    pub fn sample_exponents(&mut self) -> Exponents {
        let p1 = self.sample(MAX_EXPONENT - 1) + 1;
        let p2 = self.sample(MAX_EXPONENT - 1) + 1;
        let p3 = self.sample(p2 - 1) + 1;
        let p4 = self.sample(p3 - 1) + 1;
        Exponents { p1, p2, p3, p4 }
    }

    /// Seed for a fresh [`NoiseSource`](crate::NoiseSource).
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }
}
