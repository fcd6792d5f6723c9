//! The benchmark loop: sample, build, schedule, time, record.

use std::io::Write;
use std::time::Duration;

use log::{debug, info};

use crate::pipeline::Pipeline;
use crate::report::CsvRecorder;
use crate::sampler::ParamSampler;
use crate::schedule::{configure, ScheduleParams};
use crate::source::NoiseSource;
use crate::timer::ExecutionTimer;
use crate::{Backend, Error, Result};

/// Largest `p_input` exponent; `2^30` still fits the coordinate range.
const MAX_INPUT_EXPONENT: u32 = 30;

/// Which split widths a trial runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamMode {
    /// Always [`BenchConfig::fixed_params`]; the sampled values are drawn and dropped.
    #[default]
    Fixed,
    /// `2^p` of the sampled exponents.
    Sampled,
}

/// Output rectangle realized by each trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentMode {
    Fixed { width: usize, height: usize },
    /// `2^p_input` square, following the sweep.
    Swept,
}

impl Default for ExtentMode {
    fn default() -> Self {
        ExtentMode::Fixed {
            width: 8192,
            height: 8192,
        }
    }
}

/// Benchmark settings. [`Default`] is the reference run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Trials per sweep step.
    pub trials: usize,
    /// Timed rounds per trial.
    pub rounds: u32,
    /// Sweep steps `k`; step `k` uses `p_input = base_exponent + k`.
    pub sweep_steps: u32,
    pub base_exponent: u32,
    pub extent: ExtentMode,
    pub param_mode: ParamMode,
    pub fixed_params: ScheduleParams,
    /// Emit a checkpoint every this many trials; 0 disables them.
    pub progress_every: usize,
    /// Seed for the random stream; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            trials: 20,
            rounds: 1,
            sweep_steps: 1,
            base_exponent: 10,
            extent: ExtentMode::default(),
            param_mode: ParamMode::Fixed,
            fixed_params: ScheduleParams::FIXED,
            progress_every: 10,
            seed: None,
        }
    }
}

impl BenchConfig {
    /// Same as [`Default`], spelled out at call sites that mean "the reference run".
    pub fn reference() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            return Err(Error::Configuration("rounds must be positive".into()));
        }
        if self.sweep_steps == 0 {
            return Err(Error::Configuration("sweep needs at least one step".into()));
        }
        if self.trials.checked_mul(self.sweep_steps as usize).is_none() {
            return Err(Error::Configuration(format!(
                "{} trials per step over {} steps overflows the trial count",
                self.trials, self.sweep_steps
            )));
        }
        let last = self.base_exponent.saturating_add(self.sweep_steps - 1);
        if last > MAX_INPUT_EXPONENT {
            return Err(Error::Configuration(format!(
                "input exponent {last} exceeds {MAX_INPUT_EXPONENT}"
            )));
        }
        if let ExtentMode::Fixed { width, height } = self.extent {
            if width == 0 || height == 0 {
                return Err(Error::Configuration(format!(
                    "empty extent {width}x{height}"
                )));
            }
        }
        if self.param_mode == ParamMode::Fixed {
            self.fixed_params.validate()?;
        }
        Ok(())
    }

    fn input_exponent(&self, sweep: u32) -> u32 {
        self.base_exponent + sweep
    }

    fn extent(&self, sweep: u32) -> (usize, usize) {
        match self.extent {
            ExtentMode::Fixed { width, height } => (width, height),
            ExtentMode::Swept => {
                let side = 1usize << self.input_exponent(sweep);
                (side, side)
            }
        }
    }
}

/// Outcome of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialResult {
    pub sweep: u32,
    pub trial: usize,
    pub average: Duration,
    /// `2^p_input`, the size column of the CSV.
    pub extent_label: u64,
    pub width: usize,
    pub height: usize,
    pub params: ScheduleParams,
}

/// Progress notifications from [`Benchmark::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialEvent {
    Checkpoint { sweep: u32, trial: usize },
    Parameters { trial: usize, params: ScheduleParams },
    Measured(TrialResult),
}

/// Runs trials against a backend and records them.
pub struct Benchmark<B> {
    config: BenchConfig,
    timer: ExecutionTimer<B>,
    sampler: ParamSampler,
}

impl<B: Backend> Benchmark<B> {
    pub fn new(config: BenchConfig, backend: B) -> Result<Self> {
        config.validate()?;
        let sampler = match config.seed {
            Some(seed) => ParamSampler::seeded(seed),
            None => ParamSampler::from_entropy(),
        };
        Ok(Self {
            config,
            timer: ExecutionTimer::new(backend),
            sampler,
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Total number of trials [`run`](Self::run) performs.
    pub fn total_trials(&self) -> usize {
        self.config
            .trials
            .saturating_mul(self.config.sweep_steps as usize)
    }

    /// Run every sweep step and trial, writing one row per trial.
    ///
    /// The first failure aborts the run and is returned as [`Error::Trial`];
    /// rows of earlier trials are already flushed to `recorder`.
    pub fn run<W: Write>(
        &mut self,
        recorder: &mut CsvRecorder<W>,
        mut on_event: impl FnMut(&TrialEvent),
    ) -> Result<Vec<TrialResult>> {
        let mut results = Vec::new();

        for sweep in 0..self.config.sweep_steps {
            info!(
                "sweep step {} (p_input = {})",
                sweep,
                self.config.input_exponent(sweep)
            );
            for trial in 0..self.config.trials {
                let every = self.config.progress_every;
                if every > 0 && trial % every == 0 {
                    on_event(&TrialEvent::Checkpoint { sweep, trial });
                }

                let result = self
                    .run_trial(sweep, trial, &mut on_event)
                    .and_then(|r| recorder.record(&r).map(|()| r))
                    .map_err(|e| Error::Trial {
                        sweep,
                        trial,
                        source: Box::new(e),
                    })?;

                on_event(&TrialEvent::Measured(result));
                results.push(result);
            }
        }
        Ok(results)
    }

    fn run_trial(
        &mut self,
        sweep: u32,
        trial: usize,
        on_event: &mut impl FnMut(&TrialEvent),
    ) -> Result<TrialResult> {
        // always drawn so the random stream advances the same way in every mode
        let exponents = self.sampler.sample_exponents();
        let params = match self.config.param_mode {
            ParamMode::Fixed => self.config.fixed_params,
            ParamMode::Sampled => exponents.to_params(),
        };
        debug!("trial {}: sampled {:?}, using {}", trial, exponents, params);
        on_event(&TrialEvent::Parameters { trial, params });

        let pipeline = Pipeline::build(NoiseSource::new(self.sampler.next_seed()));
        let schedule = configure(params)?;

        let (width, height) = self.config.extent(sweep);
        let timing = self
            .timer
            .run(&pipeline, &schedule, width, height, self.config.rounds)?;

        Ok(TrialResult {
            sweep,
            trial,
            average: timing.average(),
            extent_label: 1u64 << self.config.input_exponent(sweep),
            width,
            height,
            params,
        })
    }
}
