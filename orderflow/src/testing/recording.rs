//! Sinks that record what a run reported.

use crate::pipeline::{LogLevel, LogSink, ProgressSink, ProgressUpdate};
use parking_lot::Mutex;

/// Records every log line.
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines in order.
    #[must_use]
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    /// Messages at `level`.
    #[must_use]
    pub fn at(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Warning messages.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.at(LogLevel::Warning)
    }

    /// Error messages.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.at(LogLevel::Error)
    }

    /// Returns true if any line contains `fragment`.
    #[must_use]
    pub fn contains(&self, fragment: &str) -> bool {
        self.lines.lock().iter().any(|(_, m)| m.contains(fragment))
    }
}

impl LogSink for RecordingLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

/// Records every progress update.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgressSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All updates in order.
    #[must_use]
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().clone()
    }

    /// Fractions in order.
    #[must_use]
    pub fn fractions(&self) -> Vec<f64> {
        self.updates.lock().iter().map(|u| u.fraction).collect()
    }

    /// Step names in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<String> {
        self.updates.lock().iter().map(|u| u.step_name.clone()).collect()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn report(&self, update: &ProgressUpdate) {
        self.updates.lock().push(update.clone());
    }
}
