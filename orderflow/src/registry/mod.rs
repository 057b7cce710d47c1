//! Step registry.
//!
//! Which steps run, and in what order, is data: rows of the `CommonCode`
//! table. Behaviour stays in code, in the [`StepCatalog`](crate::pipeline::StepCatalog).

mod codes;
mod step_registry;

#[cfg(test)]
pub use codes::MockConfigStore;
pub use codes::{CommonCode, ConfigStore, OPTIONAL_MARKER};
pub use step_registry::{PlanSource, ProcessingStep, ResolvedStep, StepPlan, StepRegistry};
