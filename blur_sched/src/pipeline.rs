//! The two-stage box blur, as pure definitions.

use std::fmt;
use std::sync::Arc;

use crate::blur::Buffer;
use crate::source::Source;
use crate::Result;

/// A stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// `(input(x-1, y) + input(x, y) + input(x+1, y)) / 3`
    BlurX,
    /// `(blur_x(x, y-1) + blur_x(x, y) + blur_x(x, y+1)) / 3`
    BlurY,
}

impl Stage {
    pub const fn name(self) -> &'static str {
        match self {
            Stage::BlurX => "blur_x",
            Stage::BlurY => "blur_y",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Average of three taps, truncating toward zero.
#[inline(always)]
pub(crate) fn avg3(a: i32, b: i32, c: i32) -> i32 {
    (a + b + c) / 3
}

/// `blur_y(blur_x(input))` over an unbounded domain.
///
/// Holds no storage; bounds are only supplied when the output is realized.
#[derive(Clone)]
pub struct Pipeline {
    input: Arc<dyn Source>,
}

impl Pipeline {
    pub fn build<S: Source + 'static>(input: S) -> Self {
        Self {
            input: Arc::new(input),
        }
    }

    pub(crate) fn shared_input(&self) -> Arc<dyn Source> {
        Arc::clone(&self.input)
    }

    #[inline]
    pub fn blur_x(&self, x: i32, y: i32) -> i32 {
        let input = &self.input;
        avg3(input.at(x - 1, y), input.at(x, y), input.at(x + 1, y))
    }

    #[inline]
    pub fn blur_y(&self, x: i32, y: i32) -> i32 {
        avg3(self.blur_x(x, y - 1), self.blur_x(x, y), self.blur_x(x, y + 1))
    }

    /// Evaluate `stage` at one point with every dependency inlined.
    pub fn eval(&self, stage: Stage, x: i32, y: i32) -> i32 {
        match stage {
            Stage::BlurX => self.blur_x(x, y),
            Stage::BlurY => self.blur_y(x, y),
        }
    }

    /// Realize `blur_y` over `[0, width) x [0, height)` with no schedule at all.
    ///
    /// Every pixel recomputes its nine input taps. Slow, but it is the
    /// definition every scheduled realization must match.
    pub fn realize_reference(&self, width: usize, height: usize) -> Result<Buffer> {
        let mut out = Buffer::alloc(width, height)?;
        for (y, row) in (0i32..).zip(out.rows_mut()) {
            for (x, v) in (0i32..).zip(row.iter_mut()) {
                *v = self.blur_y(x, y);
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &[Stage::BlurX, Stage::BlurY])
            .finish()
    }
}
