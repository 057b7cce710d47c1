//! Pipeline execution.
//!
//! A run resolves an ordered [`StepPlan`](crate::registry::StepPlan), starts
//! the [`RunTracker`](crate::tracker::RunTracker), and drives each step through
//! an error boundary that contains errors, timeouts and panics. The result is
//! a single [`RunReport`].

mod catalog;
mod executor;
mod outcome;
mod request;
mod sinks;
mod state;
mod step;
pub mod steps;

#[cfg(test)]
mod integration_tests;

pub use catalog::StepCatalog;
pub use executor::PipelineExecutor;
pub use outcome::{FailureRecord, OutcomeKind, RunOutcome, RunReport};
pub use request::{BatchConfirm, ConfirmFn, RunRequest};
pub use sinks::{LogLevel, LogSink, NoOpSink, ProgressSink, ProgressUpdate};
pub use state::{JobState, OrderRecord};
pub use step::{Criticality, Step, StepContext, StepOutcome};
