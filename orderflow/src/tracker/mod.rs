//! Run tracking.
//!
//! The [`RunTracker`] enforces that at most one run is in flight and fans
//! out step and heartbeat events to registered [`RunEventSink`]s.

mod events;
mod run_tracker;

pub use events::{
    CollectingRunEventSink, LoggingRunEventSink, NoOpRunEventSink, RunEvent, RunEventSink,
};
pub use run_tracker::{RunSnapshot, RunTracker, TrackerState, DEFAULT_TICK_INTERVAL};
