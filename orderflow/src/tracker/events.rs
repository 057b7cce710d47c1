//! Run lifecycle events and the sinks that receive them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, Level};
use uuid::Uuid;

/// An event emitted by the [`RunTracker`](super::RunTracker).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run started.
    Started {
        /// The run identifier.
        run_id: Uuid,
        /// How many steps the run intends to execute.
        target_steps: usize,
        /// Wall-clock start time.
        started_at: DateTime<Utc>,
    },
    /// A step finished and the counter moved.
    StepUpdated {
        /// The run identifier.
        run_id: Uuid,
        /// 1-based position of the step in the run's step list.
        step_index: usize,
        /// Display name of the step.
        step_name: String,
        /// Number of steps finished so far.
        current_step: usize,
        /// How many steps the run intends to execute.
        target_steps: usize,
        /// `current_step / target_steps`.
        fraction: f64,
    },
    /// Periodic heartbeat while the run is in flight.
    TimeUpdated {
        /// The run identifier.
        run_id: Uuid,
        /// Time since the run started.
        elapsed: Duration,
    },
    /// The run finished, whatever its outcome.
    Completed {
        /// The run identifier.
        run_id: Uuid,
        /// Number of steps finished.
        steps_completed: usize,
        /// How many steps the run intended to execute.
        target_steps: usize,
        /// Total run time, frozen at completion.
        elapsed: Duration,
    },
}

impl RunEvent {
    /// Dotted event type, e.g. `run.step_updated`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "run.started",
            Self::StepUpdated { .. } => "run.step_updated",
            Self::TimeUpdated { .. } => "run.time_updated",
            Self::Completed { .. } => "run.completed",
        }
    }

    /// The run this event belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Started { run_id, .. }
            | Self::StepUpdated { run_id, .. }
            | Self::TimeUpdated { run_id, .. }
            | Self::Completed { run_id, .. } => *run_id,
        }
    }
}

/// Receiver of run events.
///
/// Sinks are called synchronously while the tracker holds its state lock, so
/// they must be quick and must not call back into the tracker.
pub trait RunEventSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: &RunEvent);
}

impl<F> RunEventSink for F
where
    F: Fn(&RunEvent) + Send + Sync,
{
    fn emit(&self, event: &RunEvent) {
        self(event);
    }
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRunEventSink;

impl RunEventSink for NoOpRunEventSink {
    fn emit(&self, _event: &RunEvent) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingRunEventSink {
    level: Level,
}

impl Default for LoggingRunEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingRunEventSink {
    /// Creates a logging sink at the given level (DEBUG or INFO).
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl RunEventSink for LoggingRunEventSink {
    fn emit(&self, event: &RunEvent) {
        // Heartbeats are noisy; keep them at debug regardless of level.
        if matches!(event, RunEvent::TimeUpdated { .. }) || self.level == Level::DEBUG {
            debug!(event_type = event.event_type(), run_id = %event.run_id(), event = ?event, "Run event");
        } else {
            info!(event_type = event.event_type(), run_id = %event.run_id(), event = ?event, "Run event");
        }
    }
}

/// A sink that stores events, for tests and for UIs that poll.
#[derive(Debug, Default)]
pub struct CollectingRunEventSink {
    events: RwLock<Vec<RunEvent>>,
}

impl CollectingRunEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the events with the given dotted type.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Counts events with the given dotted type.
    #[must_use]
    pub fn count_of_type(&self, event_type: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

impl RunEventSink for CollectingRunEventSink {
    fn emit(&self, event: &RunEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn time_event() -> RunEvent {
        RunEvent::TimeUpdated {
            run_id: Uuid::nil(),
            elapsed: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(time_event().event_type(), "run.time_updated");
        assert_eq!(time_event().run_id(), Uuid::nil());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(time_event()).unwrap();
        assert_eq!(json["type"], "time_updated");
    }

    #[test]
    fn test_noop_and_logging_sinks_accept_events() {
        NoOpRunEventSink.emit(&time_event());
        LoggingRunEventSink::default().emit(&time_event());
        LoggingRunEventSink::debug().emit(&time_event());
    }

    #[test]
    fn test_closure_sink() {
        let count = AtomicUsize::new(0);
        let sink = |_: &RunEvent| {
            count.fetch_add(1, Ordering::SeqCst);
        };
        sink.emit(&time_event());
        sink.emit(&time_event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_collecting_sink_filter() {
        let sink = CollectingRunEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&time_event());
        sink.emit(&RunEvent::Completed {
            run_id: Uuid::nil(),
            steps_completed: 1,
            target_steps: 1,
            elapsed: Duration::from_secs(12),
        });

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.count_of_type("run.completed"), 1);
        assert_eq!(sink.events_of_type("run.time_updated").len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
