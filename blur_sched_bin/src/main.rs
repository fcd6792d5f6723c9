use std::path::PathBuf;

use anyhow::{Context, Result};
use blur_sched::{
    BenchConfig, Benchmark, CpuBackend, CsvRecorder, ExtentMode, ParamMode, TimeUnit, TrialEvent,
    DEFAULT_OUTPUT,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

/// Time a tiled, vectorized, parallel two-pass box blur and write one CSV row per trial
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// CSV file to write (truncated if it exists)
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Trials per sweep step
    #[arg(short, long, default_value_t = 20)]
    trials: usize,

    /// Timed rounds per trial; each round compiles and runs
    #[arg(short, long, default_value_t = 1)]
    rounds: u32,

    /// Side of the square output realized by each trial
    #[arg(long, default_value_t = 8192, conflicts_with = "sweep_extent")]
    extent: usize,

    /// Realize 2^p_input x 2^p_input instead of a fixed extent
    #[arg(long)]
    sweep_extent: bool,

    /// Number of sweep steps; step k uses p_input = base exponent + k
    #[arg(long, default_value_t = 1)]
    sweep_steps: u32,

    /// p_input of the first sweep step
    #[arg(long, default_value_t = 10)]
    base_exponent: u32,

    /// Run with the sampled power-of-two split widths instead of 8,256,128,8
    #[arg(long)]
    sampled_params: bool,

    /// Seed for the random stream (default: OS entropy)
    #[arg(long)]
    seed: Option<u64>,

    /// Unit of the time column: s, ms or us
    #[arg(long, default_value = "us")]
    time_unit: TimeUnit,

    /// Drop the trailing comma at the end of each CSV row
    #[arg(long)]
    no_trailing_delimiter: bool,

    /// Print the trial index every N trials (0 disables)
    #[arg(long, default_value_t = 10)]
    progress_every: usize,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress_bar: bool,
}

impl Args {
    fn config(&self) -> BenchConfig {
        BenchConfig {
            trials: self.trials,
            rounds: self.rounds,
            sweep_steps: self.sweep_steps,
            base_exponent: self.base_exponent,
            extent: if self.sweep_extent {
                ExtentMode::Swept
            } else {
                ExtentMode::Fixed {
                    width: self.extent,
                    height: self.extent,
                }
            },
            param_mode: if self.sampled_params {
                ParamMode::Sampled
            } else {
                ParamMode::Fixed
            },
            progress_every: self.progress_every,
            seed: self.seed,
            ..BenchConfig::reference()
        }
    }
}

fn progress_bar(len: usize, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} trials")
            .context("invalid progress bar template")?,
    );
    Ok(bar)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut bench =
        Benchmark::new(args.config(), CpuBackend).context("invalid benchmark configuration")?;
    let mut recorder = CsvRecorder::create(&args.output, args.time_unit)
        .with_context(|| format!("cannot create {}", args.output.display()))?
        .trailing_delimiter(!args.no_trailing_delimiter);

    let bar = progress_bar(bench.total_trials(), args.no_progress_bar)?;
    let unit = recorder.unit();

    let outcome = bench.run(&mut recorder, |event| match event {
        TrialEvent::Checkpoint { trial, .. } => bar.suspend(|| println!("{}", trial)),
        TrialEvent::Parameters { params, .. } => bar.suspend(|| println!("{}", params)),
        TrialEvent::Measured(result) => {
            bar.suspend(|| println!("{}", unit.convert(result.average)));
            bar.inc(1);
        }
    });
    bar.finish_and_clear();

    let results = outcome.map_err(|e| {
        let what = match (e.sweep(), e.trial()) {
            (Some(sweep), Some(trial)) => {
                format!("{} in trial {} of sweep step {}", e.kind(), trial, sweep)
            }
            _ => e.kind().to_string(),
        };
        anyhow::Error::new(e).context(what)
    })?;
    recorder
        .finish()
        .with_context(|| format!("cannot flush {}", args.output.display()))?;

    if !results.is_empty() {
        let mean = results
            .iter()
            .map(|r| unit.convert(r.average))
            .sum::<f64>()
            / results.len() as f64;
        info!("{} trials, mean {} {}", results.len(), mean, unit);
    }

    println!("Success!");
    Ok(())
}
