//! CSV output, one row per trial.
//!
//! Row layout: `average_time,extent_label,v1,v2,v3,v4,` followed by a newline.
//! The trailing delimiter is kept by default so files line up with earlier
//! runs of the harness.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, info};

use crate::driver::TrialResult;
use crate::Result;

/// File name used when none is given.
pub const DEFAULT_OUTPUT: &str = "halide_blur_cpu_Xeon_2^10.csv";

/// Unit of the time column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    #[default]
    Microseconds,
}

impl TimeUnit {
    pub fn convert(self, d: Duration) -> f64 {
        let nanos = d.as_nanos() as f64;
        match self {
            TimeUnit::Seconds => nanos / 1e9,
            TimeUnit::Milliseconds => nanos / 1e6,
            TimeUnit::Microseconds => nanos / 1e3,
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Microseconds => "us",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "s" | "sec" | "seconds" => Ok(TimeUnit::Seconds),
            "ms" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "us" | "microseconds" => Ok(TimeUnit::Microseconds),
            other => Err(format!("unknown time unit `{other}` (expected s, ms or us)")),
        }
    }
}

/// Appends trial rows to a CSV stream.
///
/// Every row is flushed as soon as it is written, so rows of completed trials
/// survive an abort later in the run.
pub struct CsvRecorder<W: Write> {
    out: W,
    unit: TimeUnit,
    trailing_delimiter: bool,
    rows: usize,
}

impl CsvRecorder<BufWriter<File>> {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>, unit: TimeUnit) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        info!("writing results to {}", path.display());
        Ok(Self::new(BufWriter::new(file), unit))
    }
}

impl<W: Write> CsvRecorder<W> {
    pub fn new(out: W, unit: TimeUnit) -> Self {
        Self {
            out,
            unit,
            trailing_delimiter: true,
            rows: 0,
        }
    }

    /// Whether rows end with a `,` before the newline.
    #[must_use]
    pub fn trailing_delimiter(mut self, enabled: bool) -> Self {
        self.trailing_delimiter = enabled;
        self
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Number of rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn record(&mut self, trial: &TrialResult) -> Result<()> {
        let p = trial.params;
        write!(
            self.out,
            "{},{},{},{},{},{}",
            self.unit.convert(trial.average),
            trial.extent_label,
            p.v1,
            p.v2,
            p.v3,
            p.v4
        )?;
        if self.trailing_delimiter {
            self.out.write_all(b",")?;
        }
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        debug!("closed recorder after {} rows", self.rows);
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleParams;

    fn trial(micros: u64) -> TrialResult {
        TrialResult {
            sweep: 0,
            trial: 0,
            average: Duration::from_micros(micros),
            extent_label: 1024,
            width: 8192,
            height: 8192,
            params: ScheduleParams::FIXED,
        }
    }

    #[test]
    fn test_row_layout() {
        let mut rec = CsvRecorder::new(Vec::new(), TimeUnit::Microseconds);
        rec.record(&trial(1500)).unwrap();
        let out = String::from_utf8(rec.finish().unwrap()).unwrap();
        assert_eq!(out, "1500,1024,8,256,128,8,\n");
    }

    #[test]
    fn test_without_trailing_delimiter() {
        let mut rec =
            CsvRecorder::new(Vec::new(), TimeUnit::Milliseconds).trailing_delimiter(false);
        assert_eq!(rec.unit(), TimeUnit::Milliseconds);
        rec.record(&trial(2500)).unwrap();
        rec.record(&trial(500)).unwrap();
        assert_eq!(rec.rows(), 2);
        let out = String::from_utf8(rec.finish().unwrap()).unwrap();
        assert_eq!(out, "2.5,1024,8,256,128,8\n0.5,1024,8,256,128,8\n");
    }

    #[test]
    fn test_seconds_column() {
        assert_eq!(TimeUnit::Seconds.convert(Duration::from_millis(250)), 0.25);
        assert_eq!(TimeUnit::Microseconds.convert(Duration::from_nanos(1500)), 1.5);
    }

    #[test]
    fn test_parse_time_unit() {
        assert_eq!("ms".parse::<TimeUnit>(), Ok(TimeUnit::Milliseconds));
        assert_eq!("seconds".parse::<TimeUnit>(), Ok(TimeUnit::Seconds));
        assert!("hours".parse::<TimeUnit>().is_err());
        assert_eq!(TimeUnit::default().to_string(), "us");
    }

    #[test]
    fn test_create_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale\nstale\nstale\n").unwrap();

        let mut rec = CsvRecorder::create(&path, TimeUnit::Microseconds).unwrap();
        rec.record(&trial(10)).unwrap();
        // flushed per row, visible before finish
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "10,1024,8,256,128,8,\n");
        rec.finish().unwrap();
    }
}
