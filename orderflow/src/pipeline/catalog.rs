//! Named sets of executable steps with a built-in ordering.

use super::steps::{
    ClearBatchOrders, CollectSalesOrders, CompleteBatch, EnsureCodeTable, ExportInvoiceFile, InsertOrders,
    InsertSalesInput, MapProducts, MarkSalesProcessed, MergeDuplicates, NormalizeRows, NotifyInvoice,
    ReadSpreadsheet, RegisterBatch, SeedCodeTable, UploadInvoiceFile, ValidateRows,
};
use super::{Criticality, Step};
use crate::registry::ProcessingStep;
use std::sync::Arc;

/// Gap between default sort orders, leaving room for inserted rows.
const SORT_ORDER_STEP: i32 = 10;

/// Step implementations keyed by their registry code, in default order.
#[derive(Debug, Clone, Default)]
pub struct StepCatalog {
    steps: Vec<Arc<dyn Step>>,
}

impl StepCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The main order-to-invoice pipeline.
    #[must_use]
    pub fn main() -> Self {
        Self::new()
            .with_step(ReadSpreadsheet)
            .with_step(ValidateRows)
            .with_step(NormalizeRows)
            .with_step(MergeDuplicates)
            .with_step(EnsureCodeTable)
            .with_step(SeedCodeTable)
            .with_step(RegisterBatch)
            .with_step(ClearBatchOrders)
            .with_step(InsertOrders)
            .with_step(MapProducts)
            .with_step(ExportInvoiceFile)
            .with_step(UploadInvoiceFile)
            .with_step(NotifyInvoice)
            .with_step(CompleteBatch)
    }

    /// The sales input sub-pipeline.
    #[must_use]
    pub fn sales() -> Self {
        Self::new()
            .with_step(CollectSalesOrders)
            .with_step(InsertSalesInput)
            .with_step(MarkSalesProcessed)
    }

    /// Adds a step, replacing any step with the same key in place.
    #[must_use]
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.register(Arc::new(step));
        self
    }

    /// Adds a step, replacing any step with the same key in place.
    pub fn register(&mut self, step: Arc<dyn Step>) {
        match self.steps.iter().position(|s| s.key() == step.key()) {
            Some(pos) => self.steps[pos] = step,
            None => self.steps.push(step),
        }
    }

    /// Looks up a step by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn Step>> {
        self.steps.iter().find(|s| s.key() == key).cloned()
    }

    /// Keys in default order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.key()).collect()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the catalog has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Descriptors for the built-in ordering, as if loaded from the registry.
    #[must_use]
    pub fn default_descriptors(&self) -> Vec<ProcessingStep> {
        self.steps
            .iter()
            .zip(1..)
            .map(|(step, index)| ProcessingStep {
                index,
                key: step.key().to_string(),
                name: step.name().to_string(),
                sort_order: i32::try_from(index).map_or(i32::MAX, |i| i.saturating_mul(SORT_ORDER_STEP)),
                enabled: true,
                non_critical: step.criticality() == Criticality::NonCritical,
                description: None,
            })
            .collect()
    }
}
