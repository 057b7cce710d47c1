//! Configuration-driven step ordering.

use super::{CommonCode, ConfigStore};
use crate::errors::OrderflowError;
use crate::pipeline::{Criticality, Step, StepCatalog};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Descriptor of one ordered step, loaded from the `CommonCode` store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStep {
    /// 1-based position in the final ordered list.
    pub index: usize,
    /// `Code` column; selects the code that runs.
    pub key: String,
    /// `CodeName` column; shown in logs and progress.
    pub name: String,
    /// `SortOrder` column.
    pub sort_order: i32,
    /// `IsUsed` column.
    pub enabled: bool,
    /// `Attribute1 == "OPTIONAL"`.
    pub non_critical: bool,
    /// `Attribute2` column.
    pub description: Option<String>,
}

impl ProcessingStep {
    /// Builds a descriptor from a `CommonCode` row.
    #[must_use]
    pub fn from_code(index: usize, code: &CommonCode) -> Self {
        Self {
            index,
            key: code.code.trim().to_string(),
            name: code.code_name.trim().to_string(),
            sort_order: code.sort_order,
            enabled: code.is_used,
            non_critical: code.is_optional(),
            description: code.attribute2.clone(),
        }
    }
}

impl fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.key)
    }
}

/// A descriptor bound to the step implementation it selects.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    /// The descriptor, re-indexed to its position in the plan.
    pub descriptor: ProcessingStep,
    /// The executable step.
    pub step: Arc<dyn Step>,
}

impl ResolvedStep {
    /// Failure of a non-critical step is downgraded to a warning.
    ///
    /// A step is non-critical when either its descriptor or its implementation
    /// says so.
    #[must_use]
    pub fn criticality(&self) -> Criticality {
        if self.descriptor.non_critical {
            Criticality::NonCritical
        } else {
            self.step.criticality()
        }
    }
}

/// Where a plan's ordering came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Rows from the configuration store.
    Registry,
    /// The catalog's built-in ordering.
    Fallback,
}

/// The ordered, executable steps for one run.
#[derive(Debug, Clone)]
pub struct StepPlan {
    /// Steps in execution order.
    pub steps: Vec<ResolvedStep>,
    /// Problems found while resolving.
    pub warnings: Vec<String>,
    /// Where the ordering came from.
    pub source: PlanSource,
}

impl StepPlan {
    /// Number of steps in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Keeps at most `limit` leading steps.
    #[must_use]
    pub fn truncated(mut self, limit: usize) -> Self {
        self.steps.truncate(limit);
        self
    }

    /// Step keys in execution order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.descriptor.key.as_str()).collect()
    }
}

/// Loads step descriptors and binds them to a [`StepCatalog`].
#[derive(Clone)]
pub struct StepRegistry {
    store: Arc<dyn ConfigStore>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry").finish_non_exhaustive()
    }
}

impl StepRegistry {
    /// Creates a registry over a configuration store.
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Loads the used rows of `group`, ordered by `SortOrder` then `Code`,
    /// indexed from 1.
    pub async fn load_steps(&self, group: &str) -> Result<Vec<ProcessingStep>, OrderflowError> {
        let mut codes: Vec<CommonCode> = self
            .store
            .codes(group)
            .await?
            .into_iter()
            .filter(|c| c.is_used && c.group_code == group)
            .collect();
        codes.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.code.cmp(&b.code)));

        let steps: Vec<_> = codes
            .iter()
            .enumerate()
            .map(|(i, code)| ProcessingStep::from_code(i + 1, code))
            .collect();
        debug!(group, count = steps.len(), "Loaded step descriptors");
        Ok(steps)
    }

    /// Binds the descriptors of `group` to `catalog`.
    ///
    /// Keys the catalog does not know are skipped with a warning. If the store
    /// fails, or nothing usable remains, the catalog's default ordering is
    /// used instead.
    pub async fn resolve(&self, group: &str, catalog: &StepCatalog) -> StepPlan {
        let mut warnings = Vec::new();

        let descriptors = match self.load_steps(group).await {
            Ok(descriptors) => descriptors,
            Err(err) => {
                let message = format!("could not load step group '{group}': {err}; using built-in ordering");
                warn!(group, error = %err, "Step registry unavailable, falling back");
                warnings.push(message);
                return Self::fallback(catalog, warnings);
            }
        };

        let mut steps = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match catalog.get(&descriptor.key) {
                Some(step) => {
                    let index = steps.len() + 1;
                    steps.push(ResolvedStep {
                        descriptor: ProcessingStep { index, ..descriptor },
                        step,
                    });
                }
                None => {
                    warn!(group, key = %descriptor.key, "Unknown step key, skipping");
                    warnings.push(format!(
                        "step '{}' ({}) has no implementation and was skipped",
                        descriptor.name, descriptor.key
                    ));
                }
            }
        }

        if steps.is_empty() {
            warn!(group, "No usable step descriptors, falling back");
            warnings.push(format!("step group '{group}' has no usable steps; using built-in ordering"));
            return Self::fallback(catalog, warnings);
        }

        StepPlan {
            steps,
            warnings,
            source: PlanSource::Registry,
        }
    }

    fn fallback(catalog: &StepCatalog, warnings: Vec<String>) -> StepPlan {
        let steps = catalog
            .default_descriptors()
            .into_iter()
            .filter_map(|descriptor| {
                let step = catalog.get(&descriptor.key)?;
                Some(ResolvedStep { descriptor, step })
            })
            .collect();
        StepPlan {
            steps,
            warnings,
            source: PlanSource::Fallback,
        }
    }
}
