//! Stage timing for the benchmark pipeline.
//!
//! A [`StageTimer`] measures one stage and logs the elapsed time at debug level
//! under the `objspeed::timing` target when it is finished or dropped.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, log_enabled, Level};

const TARGET: &str = "objspeed::timing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Rotate,
    Resize,
    ModelLoad,
    Inference,
    Decode,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rotate => "rotate",
            Self::Resize => "resize",
            Self::ModelLoad => "model load",
            Self::Inference => "inference",
            Self::Decode => "decode",
            Self::Render => "render",
        };
        f.write_str(name)
    }
}

/// RAII timer for one pipeline stage.
pub struct StageTimer {
    stage: Stage,
    label: String,
    start: Instant,
    logged: bool,
}

impl StageTimer {
    pub fn start(stage: Stage, label: impl Into<String>) -> Self {
        Self {
            stage,
            label: label.into(),
            start: Instant::now(),
            logged: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer, log the stage and return its duration.
    pub fn finish(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        self.log(elapsed);
        elapsed
    }

    fn log(&mut self, elapsed: Duration) {
        if !self.logged && log_enabled!(target: TARGET, Level::Debug) {
            debug!(target: TARGET, "{} [{}] completed in {:.2?}", self.stage, self.label, elapsed);
        }
        self.logged = true;
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        self.log(elapsed);
    }
}

/// Run `f` as `stage` and return its result with the elapsed time.
pub fn time_stage<T>(stage: Stage, label: &str, f: impl FnOnce() -> T) -> (T, Duration) {
    let timer = StageTimer::start(stage, label);
    let value = f();
    (value, timer.finish())
}

/// Durations of the image preparation stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreparationTimings {
    pub rotate: Duration,
    pub resize: Duration,
}

/// Seconds with millisecond precision, the way results are reported.
pub fn format_seconds(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_stage_returns_value() {
        let (value, elapsed) = time_stage(Stage::Decode, "test", || 2 + 2);
        assert_eq!(value, 4);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_finish_measures_sleep() {
        let timer = StageTimer::start(Stage::Inference, "sleep");
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.finish() >= Duration::from_millis(10));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ModelLoad.to_string(), "model load");
        assert_eq!(Stage::Rotate.to_string(), "rotate");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(Duration::from_millis(1250)), "1.250s");
        assert_eq!(format_seconds(Duration::ZERO), "0.000s");
    }
}
