//! # Orderflow
//!
//! Turns a spreadsheet of marketplace orders into a registered batch, database
//! rows, an uploaded invoice file and a chat notification.
//!
//! - **Batch windows**: a fixed table maps wall-clock time to a named batch
//!   and checks the batch the operator declared
//! - **Run tracking**: at most one run in flight, with step and heartbeat events
//! - **Configurable steps**: the `CommonCode` table decides which steps run and
//!   in what order; code decides what they do
//! - **Contained failures**: every step runs inside an error boundary and the
//!   caller gets one outcome plus a readable message
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orderflow::prelude::*;
//!
//! let executor = PipelineExecutor::new(collaborators, StepRegistry::new(store), Arc::new(RunTracker::new()))
//!     .with_config(PipelineConfig::from_env()?);
//!
//! let request = RunRequest::from_config(executor.config(), "orders.xlsx", "2차")
//!     .with_confirm(BatchConfirm::ask(|v| prompt_operator(&v.explanation)));
//! let report = executor.run(request, &log_sink, &progress_sink).await;
//! println!("{}", report.outcome.user_message());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod batch;
pub mod cancellation;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod testing;
pub mod tracker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::{Batch, BatchClassifier, BatchSlot, BatchTable, BatchValidation, Clock, SystemClock};
    pub use crate::cancellation::CancellationToken;
    pub use crate::collaborators::{
        Collaborators, DbRow, FileStorage, Notifier, RelationalStore, SheetRow, SpreadsheetReader,
        SpreadsheetWriter, Statement, UploadResult,
    };
    pub use crate::config::PipelineConfig;
    pub use crate::errors::{
        CollaboratorError, ErrorCategory, FileFormatError, InvalidStateError, OrderflowError, Service,
        ValidationError,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        BatchConfirm, Criticality, JobState, LogLevel, LogSink, OutcomeKind, PipelineExecutor, ProgressSink,
        ProgressUpdate, RunOutcome, RunReport, RunRequest, Step, StepCatalog, StepContext, StepOutcome,
    };
    pub use crate::registry::{CommonCode, ConfigStore, ProcessingStep, StepRegistry};
    pub use crate::tracker::{RunEvent, RunEventSink, RunTracker, TrackerState};
}
