//! Tiled two-pass box blur with an explicit schedule, plus the harness that times it.
//!
//! The pipeline is declared once, as pure definitions:
//!
//! ```text
//! blur_x(x, y) = (input(x-1, y) + input(x, y) + input(x+1, y)) / 3
//! blur_y(x, y) = (blur_x(x, y-1) + blur_x(x, y) + blur_x(x, y+1)) / 3
//! ```
//!
//! A [`BlurSchedule`] then decides loop order, tiling, lane width, thread
//! parallelism and where `blur_x` is stored, without changing any value. A
//! [`Backend`] lowers pipeline + schedule into a [`Kernel`] that realizes
//! `blur_y` over a rectangle.
//!
//! # Example
//!
//! ```
//! use blur_sched::{configure, Backend, CpuBackend, Kernel, PatternSource, Pipeline, ScheduleParams};
//!
//! let pipeline = Pipeline::build(PatternSource);
//! let schedule = configure(ScheduleParams::new(8, 64, 32, 8)).unwrap();
//! let kernel = CpuBackend.compile(&pipeline, &schedule).unwrap();
//! let out = kernel.run(128, 96).unwrap();
//!
//! assert_eq!(out.get(5, 7), pipeline.blur_y(5, 7));
//! ```

mod blur;
pub mod driver;
mod lower;
pub mod pipeline;
pub mod report;
pub mod sampler;
pub mod schedule;
pub mod source;
pub mod timer;

use std::fmt;

pub use blur::{Buffer, CpuBackend, CpuKernel};
pub use driver::{BenchConfig, Benchmark, ExtentMode, ParamMode, TrialEvent, TrialResult};
pub use lower::{LoopNest, Storage};
pub use pipeline::{Pipeline, Stage};
pub use report::{CsvRecorder, TimeUnit, DEFAULT_OUTPUT};
pub use sampler::{Exponents, ParamSampler};
pub use schedule::{configure, BlurSchedule, Directive, ScheduleParams, StageSchedule, Var};
pub use source::{NoiseSource, PatternSource, Source};
pub use timer::{ExecutionTimer, Timing};

/// Errors that can occur while configuring, compiling or running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid schedule configuration: {0}")]
    Configuration(String),
    #[error("cannot lower schedule of {stage}: {reason}")]
    Compilation { stage: Stage, reason: String },
    #[error("realization failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("trial {trial} of sweep step {sweep} failed")]
    Trial {
        sweep: u32,
        trial: usize,
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Compilation,
    Execution,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Compilation => "compilation error",
            ErrorKind::Execution => "execution error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Returns the class of this error, looking through [`Error::Trial`] wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Compilation { .. } => ErrorKind::Compilation,
            Error::Execution(_) => ErrorKind::Execution,
            Error::Io(_) => ErrorKind::Io,
            Error::Trial { source, .. } => source.kind(),
        }
    }

    /// Index of the trial this error was raised in, if known.
    pub fn trial(&self) -> Option<usize> {
        match self {
            Error::Trial { trial, .. } => Some(*trial),
            _ => None,
        }
    }

    /// Sweep step of the failing trial, if known.
    pub fn sweep(&self) -> Option<u32> {
        match self {
            Error::Trial { sweep, .. } => Some(*sweep),
            _ => None,
        }
    }

    pub(crate) fn compilation(stage: Stage, reason: impl Into<String>) -> Self {
        Error::Compilation {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Compiles a pipeline plus schedule into something that can be run.
///
/// Compilation may be repeated for every realization; implementations are not
/// expected to cache.
pub trait Backend {
    type Kernel: Kernel;

    fn compile(&self, pipeline: &Pipeline, schedule: &BlurSchedule) -> Result<Self::Kernel>;
}

/// A compiled pipeline, ready to realize its output stage.
pub trait Kernel {
    /// Realize the output stage over `[0, width) x [0, height)`.
    ///
    /// Blocks until all internal (possibly multi-threaded) work is done.
    fn run(&self, width: usize, height: usize) -> Result<Buffer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_looks_through_trial_wrapper() {
        let err = Error::Trial {
            sweep: 1,
            trial: 3,
            source: Box::new(Error::Execution("out of memory".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(err.trial(), Some(3));
        assert_eq!(err.sweep(), Some(1));
        assert_eq!(err.to_string(), "trial 3 of sweep step 1 failed");
    }

    #[test]
    fn test_compilation_message_names_stage() {
        let err = Error::compilation(Stage::BlurX, "unknown loop `q`");
        assert_eq!(
            err.to_string(),
            "cannot lower schedule of blur_x: unknown loop `q`"
        );
        assert_eq!(err.kind(), ErrorKind::Compilation);
        assert_eq!(err.trial(), None);
        assert_eq!(err.sweep(), None);
    }
}
