//! Input functions feeding the pipeline.
//!
//! A [`Source`] is defined over the whole integer plane, so the blur stages
//! never need a boundary condition: `input(-1, y)` is just another value.
//! Sources are pure; the pipeline calls them again on every access instead of
//! caching.

/// A pure function of two integer coordinates.
pub trait Source: Send + Sync {
    fn at(&self, x: i32, y: i32) -> i32;

    /// Fill `out` with `at(x0 + i, y)` for each lane `i`.
    #[inline]
    fn row(&self, x0: i32, y: i32, out: &mut [i32]) {
        for (x, v) in (x0..).zip(out.iter_mut()) {
            *v = self.at(x, y);
        }
    }
}

impl<F> Source for F
where
    F: Fn(i32, i32) -> i32 + Send + Sync,
{
    #[inline]
    fn at(&self, x: i32, y: i32) -> i32 {
        self(x, y)
    }
}

/// Largest value produced by [`NoiseSource`].
pub const NOISE_MAX: i32 = 1024;

/// Pseudo-random values in `[1, 1024]`, one fixed value per coordinate.
///
/// Counter-based: the value at `(x, y)` is a hash of `(seed, x, y)`, so any
/// thread can evaluate any coordinate and a repeated access returns the same
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseSource {
    seed: u64,
}

impl NoiseSource {
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

// splitmix64 finalizer
#[inline(always)]
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl Source for NoiseSource {
    #[inline]
    fn at(&self, x: i32, y: i32) -> i32 {
        let key = (u64::from(x as u32) << 32) | u64::from(y as u32);
        let h = mix(self.seed ^ mix(key));
        (h % NOISE_MAX as u64) as i32 + 1
    }
}

/// Deterministic test pattern `((x * 31 + y * 17) mod 1024) + 1`.
///
/// Uses Euclidean remainder so negative coordinates stay in `[1, 1024]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternSource;

impl Source for PatternSource {
    #[inline]
    fn at(&self, x: i32, y: i32) -> i32 {
        (x.wrapping_mul(31).wrapping_add(y.wrapping_mul(17))).rem_euclid(NOISE_MAX) + 1
    }
}
