//! Single-run state machine with step and elapsed-time reporting.

use super::{RunEvent, RunEventSink};
use crate::errors::InvalidStateError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default heartbeat cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Lifecycle state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// No run has started since construction or the last reset.
    #[default]
    Idle,
    /// A run is in flight.
    Running,
    /// The last run finished; its snapshot is frozen. Behaves as idle for
    /// [`RunTracker::start`].
    Completed,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Point-in-time view of the tracked run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    /// Tracker state.
    pub state: TrackerState,
    /// Identifier of the current or last run.
    pub run_id: Option<Uuid>,
    /// Wall-clock start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Steps finished so far.
    pub current_step: usize,
    /// Name of the last finished step.
    pub current_step_name: Option<String>,
    /// Steps the run intends to execute.
    pub target_steps: usize,
    /// Elapsed time; frozen once the run completes.
    pub elapsed: Duration,
}

impl RunSnapshot {
    /// Returns true once the run has been completed.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.state == TrackerState::Completed
    }

    /// `current_step / target_steps`, clamped to `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        progress_fraction(self.current_step, self.target_steps)
    }
}

#[allow(clippy::cast_precision_loss)]
fn progress_fraction(current: usize, target: usize) -> f64 {
    if target == 0 {
        return 1.0;
    }
    (current as f64 / target as f64).min(1.0)
}

#[derive(Debug, Default)]
struct RunState {
    state: TrackerState,
    run_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    frozen_elapsed: Option<Duration>,
    current_step: usize,
    current_step_name: Option<String>,
    target_steps: usize,
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

impl RunState {
    fn elapsed(&self) -> Duration {
        match (self.frozen_elapsed, self.started) {
            (Some(frozen), _) => frozen,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    fn require_running(&self, operation: &str) -> Result<Uuid, InvalidStateError> {
        match (self.state, self.run_id) {
            (TrackerState::Running, Some(run_id)) => Ok(run_id),
            _ => Err(InvalidStateError::new(operation, "running", self.state.to_string())),
        }
    }

    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            state: self.state,
            run_id: self.run_id,
            started_at: self.started_at,
            current_step: self.current_step,
            current_step_name: self.current_step_name.clone(),
            target_steps: self.target_steps,
            elapsed: self.elapsed(),
        }
    }
}

#[derive(Default)]
struct Shared {
    run: Mutex<RunState>,
    sinks: RwLock<Vec<Arc<dyn RunEventSink>>>,
}

impl Shared {
    fn emit(&self, event: &RunEvent) {
        for sink in self.sinks.read().iter() {
            sink.emit(event);
        }
    }
}

/// Tracks the lifetime of at most one in-flight run.
///
/// Share it between the executor and observers with an `Arc`. All events are
/// emitted while the internal lock is held, so observers see them in order and
/// never see a heartbeat after `Completed`.
pub struct RunTracker {
    shared: Arc<Shared>,
    tick_interval: Duration,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.shared.run.lock();
        f.debug_struct("RunTracker")
            .field("state", &run.state)
            .field("run_id", &run.run_id)
            .field("current_step", &run.current_step)
            .field("target_steps", &run.target_steps)
            .field("tick_interval", &self.tick_interval)
            .finish()
    }
}

impl RunTracker {
    /// Creates an idle tracker with the default heartbeat cadence.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tick_interval(DEFAULT_TICK_INTERVAL)
    }

    /// Creates an idle tracker with a custom heartbeat cadence.
    ///
    /// The cadence applies to [`start`](Self::start). Runs driven by the
    /// pipeline executor use `PipelineConfig::tick_interval` instead.
    #[must_use]
    pub fn with_tick_interval(tick_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            tick_interval: tick_interval.max(Duration::from_millis(1)),
        }
    }

    /// Registers an event sink.
    pub fn subscribe(&self, sink: Arc<dyn RunEventSink>) {
        self.shared.sinks.write().push(sink);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TrackerState {
        self.shared.run.lock().state
    }

    /// Returns true while a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == TrackerState::Running
    }

    /// Elapsed time of the current run, or the frozen time of the last one.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.shared.run.lock().elapsed()
    }

    /// Snapshot of the current or last run.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        self.shared.run.lock().snapshot()
    }

    /// Starts a run that intends to execute `target_steps` steps.
    ///
    /// When called inside a tokio runtime a heartbeat task emits
    /// `TimeUpdated` every tick interval until the run completes.
    ///
    /// # Errors
    ///
    /// Fails if a run is already in flight.
    pub fn start(&self, target_steps: usize) -> Result<Uuid, InvalidStateError> {
        self.start_with_tick_interval(target_steps, self.tick_interval)
    }

    /// Like [`start`](Self::start), with the heartbeat cadence for this run
    /// given by the caller.
    ///
    /// # Errors
    ///
    /// Fails if a run is already in flight.
    pub fn start_with_tick_interval(
        &self,
        target_steps: usize,
        tick_interval: Duration,
    ) -> Result<Uuid, InvalidStateError> {
        let mut run = self.shared.run.lock();
        if run.state == TrackerState::Running {
            return Err(InvalidStateError::new("start", "idle or completed", run.state.to_string()));
        }

        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let generation = run.generation.wrapping_add(1);
        *run = RunState {
            state: TrackerState::Running,
            run_id: Some(run_id),
            started_at: Some(started_at),
            started: Some(Instant::now()),
            frozen_elapsed: None,
            current_step: 0,
            current_step_name: None,
            target_steps,
            generation,
            ticker: None,
        };

        self.shared.emit(&RunEvent::Started {
            run_id,
            target_steps,
            started_at,
        });

        run.ticker = self.spawn_ticker(generation, tick_interval.max(Duration::from_millis(1)));
        debug!(%run_id, target_steps, "Run started");
        Ok(run_id)
    }

    /// Records that a step finished and returns the new progress fraction.
    ///
    /// # Errors
    ///
    /// Fails unless a run is in flight.
    pub fn advance_step(&self, step_index: usize, step_name: &str) -> Result<f64, InvalidStateError> {
        let mut run = self.shared.run.lock();
        let run_id = run.require_running("advance_step")?;

        run.current_step += 1;
        run.current_step_name = Some(step_name.to_string());
        let fraction = progress_fraction(run.current_step, run.target_steps);

        self.shared.emit(&RunEvent::StepUpdated {
            run_id,
            step_index,
            step_name: step_name.to_string(),
            current_step: run.current_step,
            target_steps: run.target_steps,
            fraction,
        });
        Ok(fraction)
    }

    /// Finishes the run, freezing its elapsed time.
    ///
    /// # Errors
    ///
    /// Fails unless a run is in flight.
    pub fn complete(&self) -> Result<RunSnapshot, InvalidStateError> {
        let mut run = self.shared.run.lock();
        let run_id = run.require_running("complete")?;

        let elapsed = run.elapsed();
        run.frozen_elapsed = Some(elapsed);
        run.state = TrackerState::Completed;
        if let Some(ticker) = run.ticker.take() {
            ticker.abort();
        }

        self.shared.emit(&RunEvent::Completed {
            run_id,
            steps_completed: run.current_step,
            target_steps: run.target_steps,
            elapsed,
        });
        debug!(%run_id, steps = run.current_step, elapsed_ms = elapsed.as_millis(), "Run completed");
        Ok(run.snapshot())
    }

    /// Returns a completed tracker to `Idle`, discarding the frozen snapshot.
    ///
    /// # Errors
    ///
    /// Fails while a run is in flight.
    pub fn reset(&self) -> Result<(), InvalidStateError> {
        let mut run = self.shared.run.lock();
        if run.state == TrackerState::Running {
            return Err(InvalidStateError::new("reset", "idle or completed", "running"));
        }
        let generation = run.generation;
        *run = RunState {
            generation,
            ..RunState::default()
        };
        Ok(())
    }

    fn spawn_ticker(&self, generation: u64, period: Duration) -> Option<JoinHandle<()>> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(run_heartbeat(
                Arc::downgrade(&self.shared),
                generation,
                period,
            ))),
            Err(_) => {
                warn!("No tokio runtime; elapsed-time heartbeats disabled for this run");
                None
            }
        }
    }
}

async fn run_heartbeat(shared: Weak<Shared>, generation: u64, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let run = shared.run.lock();
        if run.state != TrackerState::Running || run.generation != generation {
            break;
        }
        if let Some(run_id) = run.run_id {
            shared.emit(&RunEvent::TimeUpdated {
                run_id,
                elapsed: run.elapsed(),
            });
        }
    }
}
