mod lanes;
mod tiled;

use std::sync::Arc;

use log::debug;

use crate::lower::{lower, LoopNest};
use crate::pipeline::Pipeline;
use crate::schedule::BlurSchedule;
use crate::source::Source;
use crate::{Backend, Error, Kernel, Result};

/// Largest extent accepted on either axis; coordinates one past the border
/// must still fit in an `i32`.
const MAX_EXTENT: usize = (i32::MAX - 1) as usize;

/// Dense row-major result of a realization.
#[derive(Clone, PartialEq, Eq)]
pub struct Buffer {
    pub(crate) data: Vec<i32>,
    width: usize,
    height: usize,
}

impl Buffer {
    /// Allocate a zeroed `width x height` buffer.
    ///
    /// # Errors
    /// - If either extent is zero or does not fit the coordinate range
    /// - If the allocation fails
    pub(crate) fn alloc(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Execution(format!(
                "empty output extent {width}x{height}"
            )));
        }
        if width > MAX_EXTENT || height > MAX_EXTENT {
            return Err(Error::Execution(format!(
                "output extent {width}x{height} exceeds the coordinate range"
            )));
        }
        let len = width
            .checked_mul(height)
            .ok_or_else(|| Error::Execution(format!("output extent {width}x{height} overflows")))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            Error::Execution(format!("cannot allocate {width}x{height} output: {e}"))
        })?;
        data.resize(len, 0);
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Returns the buffer width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the buffer height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the pixel data, row-major.
    pub fn data(&self) -> &[i32] {
        &self.data
    }

    /// Value at `(x, y)`.
    ///
    /// # Panics
    /// If the coordinate is outside the buffer.
    pub fn get(&self, x: usize, y: usize) -> i32 {
        assert!(x < self.width && y < self.height, "({x}, {y}) out of bounds");
        self.data[y * self.width + x]
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, i32> {
        self.data.chunks_exact(self.width)
    }

    pub(crate) fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, i32> {
        self.data.chunks_exact_mut(self.width)
    }

    pub fn into_vec(self) -> Vec<i32> {
        self.data
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// In-process backend: lowers the schedule and runs it on the CPU.
///
/// Tile loops marked parallel run on the rayon pool when the `rayon` feature
/// is enabled; lane loops are dispatched per CPU target with the `simd`
/// feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

/// A lowered schedule bound to its pipeline's input.
pub struct CpuKernel {
    input: Arc<dyn Source>,
    nest: LoopNest,
}

impl CpuKernel {
    pub fn loop_nest(&self) -> &LoopNest {
        &self.nest
    }
}

impl Backend for CpuBackend {
    type Kernel = CpuKernel;

    fn compile(&self, pipeline: &Pipeline, schedule: &BlurSchedule) -> Result<CpuKernel> {
        let nest = lower(schedule)?;
        debug!("compiled kernel: {:?}", nest);
        Ok(CpuKernel {
            input: pipeline.shared_input(),
            nest,
        })
    }
}

impl Kernel for CpuKernel {
    fn run(&self, width: usize, height: usize) -> Result<Buffer> {
        tiled::realize(&*self.input, &self.nest, width, height)
    }
}
