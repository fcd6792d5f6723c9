//! Wall-clock timing of compile + realize.

use std::time::{Duration, Instant};

use log::debug;

use crate::pipeline::Pipeline;
use crate::schedule::BlurSchedule;
use crate::{Backend, Error, Kernel, Result};

/// Average elapsed time over a number of rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub total: Duration,
    pub rounds: u32,
}

impl Timing {
    pub fn average(&self) -> Duration {
        self.total / self.rounds
    }
}

/// Times realizations of `blur_y` on a [`Backend`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionTimer<B> {
    backend: B,
}

impl<B: Backend> ExecutionTimer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Compile and realize over `[0, width) x [0, height)` once per round.
    ///
    /// Compilation is inside the timed region and repeated every round, so the
    /// result is compile + run cost, not steady-state run cost. The realized
    /// buffer is dropped unread.
    ///
    /// # Errors
    /// - If `rounds` is zero
    /// - Any compilation or execution error, on the first round that hits it
    pub fn run(
        &self,
        pipeline: &Pipeline,
        schedule: &BlurSchedule,
        width: usize,
        height: usize,
        rounds: u32,
    ) -> Result<Timing> {
        if rounds == 0 {
            return Err(Error::Configuration(
                "at least one timing round is required".into(),
            ));
        }

        let mut total = Duration::ZERO;
        for round in 0..rounds {
            let start = Instant::now();
            let kernel = self.backend.compile(pipeline, schedule)?;
            let out = kernel.run(width, height)?;
            let elapsed = start.elapsed();
            drop(out);

            debug!("round {}: {:?} for {}x{}", round, elapsed, width, height);
            total += elapsed;
        }

        Ok(Timing { total, rounds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{configure, ScheduleParams};
    use crate::source::PatternSource;
    use crate::{Buffer, CpuBackend, ErrorKind};
    use std::cell::Cell;

    /// Counts compilations; kernels fail after `fail_after` runs.
    struct CountingBackend {
        compiles: Cell<u32>,
        fail_after: u32,
    }

    struct CountingKernel {
        fail: bool,
    }

    impl Backend for CountingBackend {
        type Kernel = CountingKernel;

        fn compile(&self, _: &Pipeline, _: &BlurSchedule) -> Result<CountingKernel> {
            let n = self.compiles.get() + 1;
            self.compiles.set(n);
            Ok(CountingKernel {
                fail: n > self.fail_after,
            })
        }
    }

    impl Kernel for CountingKernel {
        fn run(&self, width: usize, height: usize) -> Result<Buffer> {
            if self.fail {
                return Err(Error::Execution("backend gave up".into()));
            }
            Buffer::alloc(width, height)
        }
    }

    fn fixture() -> (Pipeline, BlurSchedule) {
        (
            Pipeline::build(PatternSource),
            configure(ScheduleParams::new(8, 32, 16, 8)).unwrap(),
        )
    }

    #[test]
    fn test_single_round_average_is_the_measurement() {
        let (pipeline, schedule) = fixture();
        let timer = ExecutionTimer::new(CpuBackend);
        let t = timer.run(&pipeline, &schedule, 64, 64, 1).unwrap();
        assert_eq!(t.rounds, 1);
        assert_eq!(t.average(), t.total);
    }

    #[test]
    fn test_average_is_finite_and_non_negative() {
        let (pipeline, schedule) = fixture();
        let timer = ExecutionTimer::new(CpuBackend);
        let t = timer.run(&pipeline, &schedule, 64, 48, 3).unwrap();
        let avg = t.average().as_secs_f64();
        assert!(avg.is_finite() && avg >= 0.0);
        assert!(t.average() <= t.total);
    }

    #[test]
    fn test_compiles_every_round() {
        let (pipeline, schedule) = fixture();
        let timer = ExecutionTimer::new(CountingBackend {
            compiles: Cell::new(0),
            fail_after: u32::MAX,
        });
        timer.run(&pipeline, &schedule, 8, 8, 4).unwrap();
        assert_eq!(timer.backend().compiles.get(), 4);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let (pipeline, schedule) = fixture();
        let err = ExecutionTimer::new(CpuBackend)
            .run(&pipeline, &schedule, 64, 64, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_failure_stops_timing() {
        let (pipeline, schedule) = fixture();
        let timer = ExecutionTimer::new(CountingBackend {
            compiles: Cell::new(0),
            fail_after: 1,
        });
        let err = timer.run(&pipeline, &schedule, 8, 8, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(timer.backend().compiles.get(), 2);
    }
}
