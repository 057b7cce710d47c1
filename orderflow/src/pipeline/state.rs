//! Data handed from step to step during one run.

use crate::collaborators::{DbRow, SheetRow, UploadResult};
use crate::errors::{InvalidStateError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// A validated order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Sheet line the record came from (first line if merged).
    pub line: usize,
    /// Marketplace order number.
    pub order_no: String,
    /// Recipient name.
    pub recipient: String,
    /// Recipient phone number.
    pub phone: String,
    /// Delivery address.
    pub address: String,
    /// Product name as ordered.
    pub product: String,
    /// Ordered quantity.
    pub quantity: u32,
    /// Delivery memo.
    pub memo: Option<String>,
    /// Every sheet line folded into this record.
    pub source_lines: Vec<usize>,
}

/// Mutable state threaded through the steps of a run.
#[derive(Debug, Clone, Default)]
pub struct JobState {
    /// Raw rows read from the spreadsheet.
    pub rows: Vec<SheetRow>,
    /// Validated (and later normalised and merged) records.
    pub records: Vec<OrderRecord>,
    /// Database id of the registered batch.
    pub batch_id: Option<i64>,
    /// Order rows inserted for the batch.
    pub inserted_orders: usize,
    /// Order rows updated by product mapping.
    pub mapped_products: u64,
    /// Local invoice file.
    pub export_path: Option<PathBuf>,
    /// Where the invoice file was uploaded.
    pub upload: Option<UploadResult>,
    /// Whether the chat notification went out.
    pub notified: bool,
    /// Pending sales orders picked up by the sales sub-pipeline.
    pub sales_orders: Vec<DbRow>,
    /// Sales input rows written.
    pub sales_inserted: u64,
    /// Warnings recorded by steps, drained by the executor after each step.
    pub(crate) warnings: Vec<String>,
}

impl JobState {
    /// Records a warning that does not stop the run.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(message = %message, "Step warning");
        self.warnings.push(message);
    }

    /// Drains warnings recorded since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// The registered batch id.
    ///
    /// # Errors
    ///
    /// Fails if no batch has been registered yet.
    pub fn batch_id(&self) -> Result<i64> {
        self.batch_id.ok_or_else(|| {
            InvalidStateError::new("batch_id", "registered batch", "no batch registered").into()
        })
    }

    /// The uploaded invoice.
    ///
    /// # Errors
    ///
    /// Fails if nothing has been uploaded yet.
    pub fn upload(&self) -> Result<&UploadResult> {
        self.upload.as_ref().ok_or_else(|| {
            InvalidStateError::new("upload", "uploaded invoice", "nothing uploaded").into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    #[test]
    fn test_warnings_drain() {
        let mut state = JobState::default();
        state.warn("notifier offline");
        assert_eq!(state.take_warnings(), vec!["notifier offline".to_string()]);
        assert!(state.take_warnings().is_empty());
    }

    #[test]
    fn test_missing_batch_is_invariant_violation() {
        let state = JobState::default();
        let err = state.batch_id().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvariantViolation);
        assert!(state.upload().is_err());
    }
}
