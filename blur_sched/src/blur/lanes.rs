//! Lane loops shared by both stages.
//!
//! Each call handles one lane chunk: up to `lanes` adjacent x coordinates of
//! one row. With the `simd` feature the loops are compiled per target and
//! dispatched at runtime, so the three-tap sum and the division by 3 run in
//! vector registers.

#[cfg(feature = "simd")]
use multiversion::multiversion;

use crate::source::Source;

/// `out[i] = (a[i] + b[i] + c[i]) / 3`
#[inline(always)]
#[cfg_attr(
    feature = "simd",
    multiversion(targets("x86_64+avx2+fma", "x86_64+sse2", "aarch64+neon"))
)]
pub(crate) fn avg3(a: &[i32], b: &[i32], c: &[i32], out: &mut [i32]) {
    let n = out.len();
    let (a, b, c) = (&a[..n], &b[..n], &c[..n]);
    for (((o, &a), &b), &c) in out.iter_mut().zip(a).zip(b).zip(c) {
        *o = (a + b + c) / 3;
    }
}

/// Scratch rows for the three horizontal taps of a lane chunk.
pub(crate) struct Taps {
    left: Vec<i32>,
    mid: Vec<i32>,
    right: Vec<i32>,
}

impl Taps {
    pub(crate) fn new(lanes: usize) -> Self {
        Self {
            left: vec![0; lanes],
            mid: vec![0; lanes],
            right: vec![0; lanes],
        }
    }

    /// `blur_x` for `out.len()` lanes starting at `(x, y)`.
    ///
    /// Each tap reads the input afresh; nothing is shared between taps.
    #[inline]
    pub(crate) fn blur_x(&mut self, input: &dyn Source, x: i32, y: i32, out: &mut [i32]) {
        let n = out.len();
        input.row(x - 1, y, &mut self.left[..n]);
        input.row(x, y, &mut self.mid[..n]);
        input.row(x + 1, y, &mut self.right[..n]);
        avg3(&self.left[..n], &self.mid[..n], &self.right[..n], out);
    }
}

/// `(start, len)` of the lane chunks covering `0..len`.
///
/// Chunks are `lanes` wide; when `len` is not a multiple the last chunk is
/// shifted inwards to end at `len` and overlaps its neighbour. A span shorter
/// than one chunk is a single short chunk.
pub(crate) fn chunks(len: usize, lanes: usize) -> impl Iterator<Item = (usize, usize)> {
    let lanes = lanes.max(1);
    let width = lanes.min(len);
    let count = if len == 0 { 0 } else { len.div_ceil(lanes) };
    (0..count).map(move |i| ((i * lanes).min(len - width), width))
}
