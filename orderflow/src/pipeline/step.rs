//! The `Step` trait and the context a step runs in.

use super::JobState;
use crate::batch::BatchSlot;
use crate::collaborators::Collaborators;
use crate::config::PipelineConfig;
use crate::errors::{OrderflowError, Result, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// How a step failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure aborts the run.
    #[default]
    Critical,
    /// Failure is logged as a warning and the run continues.
    NonCritical,
}

/// What a step asks the executor to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Carry on with the next step.
    Continue,
    /// There is nothing to process; stop without error.
    NoData(String),
}

impl StepOutcome {
    /// Shorthand for [`StepOutcome::NoData`].
    #[must_use]
    pub fn no_data(reason: impl Into<String>) -> Self {
        Self::NoData(reason.into())
    }
}

/// Read-only inputs shared by every step of a run.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The run identifier.
    pub run_id: Uuid,
    /// Input spreadsheet; absent for the sales sub-pipeline.
    pub spreadsheet_path: Option<PathBuf>,
    /// Batch and business day the run is filed under.
    pub slot: BatchSlot,
    /// Pipeline configuration.
    pub config: PipelineConfig,
    /// External services.
    pub collaborators: Collaborators,
}

impl StepContext {
    /// The input spreadsheet.
    ///
    /// # Errors
    ///
    /// Fails for runs that have no spreadsheet.
    pub fn spreadsheet_path(&self) -> Result<&Path> {
        self.spreadsheet_path
            .as_deref()
            .ok_or_else(|| OrderflowError::from(ValidationError::new("this run has no input spreadsheet")))
    }
}

/// One named unit of work in a pipeline.
///
/// Steps run strictly in order and hand data forward through [`JobState`].
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Stable key matched against the `Code` column of the step registry.
    fn key(&self) -> &str;

    /// Default display name, used when the registry does not supply one.
    fn name(&self) -> &str;

    /// Whether a failure aborts the run.
    fn criticality(&self) -> Criticality {
        Criticality::Critical
    }

    /// Executes the step.
    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome>;
}
