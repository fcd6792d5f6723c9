//! Loop-transformation directives and the fixed tiling recipe for the blur.
//!
//! A schedule never changes what a stage computes, only the order of the
//! loops, the width of the lane loops, which loops run on threads and where
//! intermediate values are stored.

use std::fmt;

use crate::pipeline::Stage;
use crate::{Error, Result};

/// Name of a loop variable.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(pub &'static str);

impl Var {
    pub const X: Var = Var("x");
    pub const Y: Var = Var("y");
    pub const X_O: Var = Var("x_o");
    pub const X_I: Var = Var("x_i");
    pub const Y_O: Var = Var("y_o");
    pub const Y_I: Var = Var("y_i");
    pub const X_VO: Var = Var("x_vo");
    pub const X_VI: Var = Var("x_vi");
    pub const X_I_VO: Var = Var("x_i_vo");
    pub const X_I_VI: Var = Var("x_i_vi");

    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// One scheduling directive, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Compute the whole stage before any consumer runs.
    ComputeRoot,
    /// Recompute the stage inside the consumer's loop `at`, for the region that
    /// one iteration of `at` needs.
    ComputeAt { consumer: Stage, at: Var },
    /// Replace `var` by `outer * factor + inner`.
    Split {
        var: Var,
        outer: Var,
        inner: Var,
        factor: u32,
    },
    /// New nesting of the listed loops, innermost first.
    Reorder(Vec<Var>),
    /// Run `var` as a lane loop.
    Vectorize(Var),
    /// Distribute iterations of `var` across threads.
    Parallel(Var),
}

/// Directives bound to one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSchedule {
    stage: Stage,
    directives: Vec<Directive>,
}

impl StageSchedule {
    /// Empty schedule: the stage is inlined into its consumers (or, for the
    /// output stage, computed in plain row-major order).
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            directives: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    fn push(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    #[must_use]
    pub fn compute_root(self) -> Self {
        self.push(Directive::ComputeRoot)
    }

    #[must_use]
    pub fn compute_at(self, consumer: Stage, at: Var) -> Self {
        self.push(Directive::ComputeAt { consumer, at })
    }

    #[must_use]
    pub fn split(self, var: Var, outer: Var, inner: Var, factor: u32) -> Self {
        self.push(Directive::Split {
            var,
            outer,
            inner,
            factor,
        })
    }

    /// Loops listed innermost first.
    #[must_use]
    pub fn reorder(self, vars: &[Var]) -> Self {
        self.push(Directive::Reorder(vars.to_vec()))
    }

    #[must_use]
    pub fn vectorize(self, var: Var) -> Self {
        self.push(Directive::Vectorize(var))
    }

    #[must_use]
    pub fn parallel(self, var: Var) -> Self {
        self.push(Directive::Parallel(var))
    }
}

/// Schedules for both stages of the blur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlurSchedule {
    pub blur_x: StageSchedule,
    pub blur_y: StageSchedule,
}

impl BlurSchedule {
    pub fn new(blur_x: StageSchedule, blur_y: StageSchedule) -> Self {
        Self { blur_x, blur_y }
    }

    /// No directives at all: `blur_x` inlined, `blur_y` row-major.
    pub fn unscheduled() -> Self {
        Self::new(StageSchedule::new(Stage::BlurX), StageSchedule::new(Stage::BlurY))
    }
}

/// Tile and lane widths for the blur recipe.
///
/// - `v1`: lane width of `blur_x`
/// - `v2`: tile width of `blur_y`
/// - `v3`: tile height of `blur_y`
/// - `v4`: lane width of `blur_y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleParams {
    pub v1: u32,
    pub v2: u32,
    pub v3: u32,
    pub v4: u32,
}

impl ScheduleParams {
    /// The values the benchmark actually runs with.
    pub const FIXED: ScheduleParams = ScheduleParams::new(8, 256, 128, 8);

    pub const fn new(v1: u32, v2: u32, v3: u32, v4: u32) -> Self {
        Self { v1, v2, v3, v4 }
    }

    /// All widths must be positive and nested as `v4 <= v3 <= v2`.
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("v1", self.v1), ("v2", self.v2), ("v3", self.v3), ("v4", self.v4)] {
            if v == 0 {
                return Err(Error::Configuration(format!(
                    "split width {name} must be positive"
                )));
            }
        }
        if self.v3 > self.v2 {
            return Err(Error::Configuration(format!(
                "v3 ({}) must not exceed v2 ({})",
                self.v3, self.v2
            )));
        }
        if self.v4 > self.v3 {
            return Err(Error::Configuration(format!(
                "v4 ({}) must not exceed v3 ({})",
                self.v4, self.v3
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ScheduleParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.v1, self.v2, self.v3, self.v4)
    }
}

/// Attach the tiled, vectorized, parallel recipe to both stages.
///
/// `blur_y` is split into `v2 x v3` tiles walked tile-major, each tile's x
/// loop split again into lanes of `v4`, with both tile loops parallel.
/// `blur_x` is recomputed per tile of `blur_y` (at `x_o`) in lanes of `v1`.
pub fn configure(params: ScheduleParams) -> Result<BlurSchedule> {
    params.validate()?;
    let ScheduleParams { v1, v2, v3, v4 } = params;

    let blur_x = StageSchedule::new(Stage::BlurX)
        .compute_at(Stage::BlurY, Var::X_O)
        .split(Var::X, Var::X_VO, Var::X_VI, v1)
        .vectorize(Var::X_VI);

    let blur_y = StageSchedule::new(Stage::BlurY)
        .compute_root()
        .split(Var::X, Var::X_O, Var::X_I, v2)
        .split(Var::Y, Var::Y_O, Var::Y_I, v3)
        .reorder(&[Var::X_I, Var::Y_I, Var::X_O, Var::Y_O])
        .split(Var::X_I, Var::X_I_VO, Var::X_I_VI, v4)
        .vectorize(Var::X_I_VI)
        .parallel(Var::Y_O)
        .parallel(Var::X_O);

    Ok(BlurSchedule::new(blur_x, blur_y))
}
