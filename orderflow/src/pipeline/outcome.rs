//! Run outcomes and the report returned to callers.

use crate::collaborators::UploadResult;
use crate::errors::{ErrorCategory, OrderflowError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Record of a step failure, captured at the step boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Registry key of the failing step.
    pub step_key: String,
    /// Display name of the failing step.
    pub step: String,
    /// Error message.
    pub error: String,
    /// Coarse classification.
    pub category: ErrorCategory,
    /// Messages of the underlying causes, outermost first.
    pub causes: Vec<String>,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a failure record without causes.
    #[must_use]
    pub fn new(
        step_key: impl Into<String>,
        step: impl Into<String>,
        category: ErrorCategory,
        error: impl Into<String>,
    ) -> Self {
        Self {
            step_key: step_key.into(),
            step: step.into(),
            error: error.into(),
            category,
            causes: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Captures an error raised by a step.
    #[must_use]
    pub fn from_error(step_key: impl Into<String>, step: impl Into<String>, err: &OrderflowError) -> Self {
        let mut record = Self::new(step_key, step, err.category(), err.to_string());
        record.causes = err.cause_chain();
        if let OrderflowError::Validation(validation) = err {
            record.causes.extend(validation.details.iter().cloned());
        }
        record
    }

    /// Message followed by every cause.
    #[must_use]
    pub fn full_message(&self) -> String {
        std::iter::once(self.error.as_str())
            .chain(self.causes.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n  caused by: ")
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed ({}): {}", self.step, self.category, self.error)
    }
}

/// The caller-facing tri-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// All executed steps succeeded.
    Success,
    /// Nothing was (or needed to be) done.
    NothingDone,
    /// Something broke.
    Failed,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every executed step succeeded (non-critical failures allowed).
    Success,
    /// A step found nothing to process.
    NoData(String),
    /// The run stopped on request before finishing.
    Aborted(String),
    /// A critical step failed, or the run could not start.
    Failed(FailureRecord),
}

impl RunOutcome {
    /// Collapses the outcome to the caller-facing tri-state.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success => OutcomeKind::Success,
            Self::NoData(_) | Self::Aborted(_) => OutcomeKind::NothingDone,
            Self::Failed(_) => OutcomeKind::Failed,
        }
    }

    /// Returns true for [`RunOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The failure, if the run failed.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Message suitable for showing to an operator.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Success => "Processing completed successfully.".to_string(),
            Self::NoData(reason) => {
                format!("Nothing was processed: {reason}. Please check the input file and batch.")
            }
            Self::Aborted(reason) => format!("Processing was stopped: {reason}. Nothing further was done."),
            Self::Failed(failure) => format!(
                "Processing failed at '{}': {}. Please check the logs for details.",
                failure.step, failure.error
            ),
        }
    }
}

/// Everything a caller learns about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Tracker run id; absent when the run never started.
    pub run_id: Option<Uuid>,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Steps that finished and reported progress.
    pub steps_executed: usize,
    /// Steps the run intended to execute.
    pub target_steps: usize,
    /// Warnings collected along the way.
    pub warnings: Vec<String>,
    /// Failures of non-critical steps that the run tolerated.
    pub contained_failures: Vec<FailureRecord>,
    /// Files uploaded by the run.
    pub uploads: Vec<UploadResult>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl RunReport {
    /// A report for a run that ended before the tracker started.
    #[must_use]
    pub fn not_started(outcome: RunOutcome, warnings: Vec<String>) -> Self {
        Self {
            run_id: None,
            outcome,
            steps_executed: 0,
            target_steps: 0,
            warnings,
            contained_failures: Vec::new(),
            uploads: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Shorthand for `self.outcome.kind()`.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }
}
