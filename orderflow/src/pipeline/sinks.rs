//! Caller-supplied log and progress sinks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log line sent to a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Normal progress.
    Info,
    /// Something the operator should look at; the run continues.
    Warning,
    /// The run failed.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Receives human-readable log lines from a run, in order.
pub trait LogSink: Send + Sync {
    /// Handles one line.
    fn log(&self, level: LogLevel, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message);
    }
}

/// Progress after a completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// 1-based position of the step in the plan.
    pub step_index: usize,
    /// Display name of the step.
    pub step_name: String,
    /// Steps finished so far.
    pub current_step: usize,
    /// Steps the run intends to execute.
    pub target_steps: usize,
    /// `current_step / target_steps`, in `[0, 1]`.
    pub fraction: f64,
}

impl ProgressUpdate {
    /// Whole-number percentage.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Receives a progress update once per completed step, in order.
pub trait ProgressSink: Send + Sync {
    /// Handles one update.
    fn report(&self, update: &ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: &ProgressUpdate) {
        self(update);
    }
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl LogSink for NoOpSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

impl ProgressSink for NoOpSink {
    fn report(&self, _update: &ProgressUpdate) {}
}
