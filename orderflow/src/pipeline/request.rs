//! Run parameters.

use crate::batch::BatchValidation;
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Callback deciding whether a mismatched batch label may proceed.
pub type ConfirmFn = Arc<dyn Fn(&BatchValidation) -> bool + Send + Sync>;

/// What to do when the declared batch does not match the clock.
#[derive(Clone, Default)]
pub enum BatchConfirm {
    /// Proceed anyway (deliberate override or backfill).
    #[default]
    Continue,
    /// Stop without side effects.
    Cancel,
    /// Ask the callback.
    Ask(ConfirmFn),
}

impl BatchConfirm {
    /// Asks `decide` on mismatch.
    #[must_use]
    pub fn ask<F>(decide: F) -> Self
    where
        F: Fn(&BatchValidation) -> bool + Send + Sync + 'static,
    {
        Self::Ask(Arc::new(decide))
    }

    /// Returns true if the run may proceed despite `validation`.
    #[must_use]
    pub fn allows(&self, validation: &BatchValidation) -> bool {
        match self {
            Self::Continue => true,
            Self::Cancel => false,
            Self::Ask(decide) => decide(validation),
        }
    }
}

impl fmt::Debug for BatchConfirm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "Continue"),
            Self::Cancel => write!(f, "Cancel"),
            Self::Ask(_) => write!(f, "Ask(<fn>)"),
        }
    }
}

/// Parameters of one main pipeline run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Input spreadsheet.
    pub spreadsheet_path: PathBuf,
    /// Maximum number of ordered steps to execute (at least 1).
    pub test_level: usize,
    /// Batch label the operator declared.
    pub batch_label: String,
    /// Mismatch policy.
    pub confirm: BatchConfirm,
    /// Optional cooperative cancellation.
    pub cancel: Option<CancellationToken>,
}

impl RunRequest {
    /// Creates a request that continues on batch mismatch.
    #[must_use]
    pub fn new(spreadsheet_path: impl Into<PathBuf>, test_level: usize, batch_label: impl Into<String>) -> Self {
        Self {
            spreadsheet_path: spreadsheet_path.into(),
            test_level,
            batch_label: batch_label.into(),
            confirm: BatchConfirm::default(),
            cancel: None,
        }
    }

    /// Creates a request capped at the configured test level.
    #[must_use]
    pub fn from_config(
        config: &PipelineConfig,
        spreadsheet_path: impl Into<PathBuf>,
        batch_label: impl Into<String>,
    ) -> Self {
        Self::new(spreadsheet_path, config.test_level, batch_label)
    }

    /// Sets the mismatch policy.
    #[must_use]
    pub fn with_confirm(mut self, confirm: BatchConfirm) -> Self {
        self.confirm = confirm;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use chrono::NaiveTime;

    fn mismatch() -> BatchValidation {
        let current = Batch::new(
            "2차",
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            2,
        );
        BatchValidation {
            claimed: "4차".into(),
            current,
            matches: false,
            known: true,
            explanation: "mismatch".into(),
        }
    }

    #[test]
    fn test_confirm_policies() {
        assert!(BatchConfirm::Continue.allows(&mismatch()));
        assert!(!BatchConfirm::Cancel.allows(&mismatch()));
        assert!(!BatchConfirm::ask(|v| v.known && v.claimed == "5차").allows(&mismatch()));
        assert!(BatchConfirm::ask(|v| v.claimed == "4차").allows(&mismatch()));
    }

    #[test]
    fn test_from_config_uses_test_level() {
        let config = PipelineConfig::default().with_test_level(7);
        let request = RunRequest::from_config(&config, "/tmp/orders.xlsx", "2차");
        assert_eq!(request.test_level, 7);
        assert!(request.cancel.is_none());
    }
}
