//! Maintenance of the `CommonCode` configuration table.

use crate::collaborators::Statement;
use crate::config::MAIN_STEP_GROUP;
use crate::errors::Result;
use crate::pipeline::{Criticality, JobState, Step, StepCatalog, StepContext, StepOutcome};
use async_trait::async_trait;
use tracing::{debug, info};

const CREATE_COMMON_CODE: &str = "CREATE TABLE IF NOT EXISTS CommonCode (
    GroupCode  VARCHAR(50)  NOT NULL,
    Code       VARCHAR(50)  NOT NULL,
    CodeName   VARCHAR(200) NOT NULL,
    SortOrder  INT          NOT NULL DEFAULT 0,
    IsUsed     BIT          NOT NULL DEFAULT 1,
    Attribute1 VARCHAR(200) NULL,
    Attribute2 VARCHAR(500) NULL,
    PRIMARY KEY (GroupCode, Code)
)";

const SEED_COMMON_CODE: &str = "INSERT INTO CommonCode (GroupCode, Code, CodeName, SortOrder, IsUsed, Attribute1, Attribute2)
SELECT ?, ?, ?, ?, 1, ?, ?
WHERE NOT EXISTS (SELECT 1 FROM CommonCode WHERE GroupCode = ? AND Code = ?)";

/// Creates the `CommonCode` table when it is missing.
#[derive(Debug, Default)]
pub struct EnsureCodeTable;

#[async_trait]
impl Step for EnsureCodeTable {
    fn key(&self) -> &str {
        "ensure_code_table"
    }

    fn name(&self) -> &str {
        "Ensure configuration table"
    }

    async fn execute(&self, ctx: &StepContext, _state: &mut JobState) -> Result<StepOutcome> {
        ctx.collaborators
            .database
            .execute(&Statement::new(CREATE_COMMON_CODE))
            .await?;
        debug!("CommonCode table present");
        Ok(StepOutcome::Continue)
    }
}

/// Inserts the built-in main step ordering into `CommonCode`, leaving rows
/// that already exist untouched.
#[derive(Debug, Default)]
pub struct SeedCodeTable;

#[async_trait]
impl Step for SeedCodeTable {
    fn key(&self) -> &str {
        "seed_code_table"
    }

    fn name(&self) -> &str {
        "Seed step configuration"
    }

    fn criticality(&self) -> Criticality {
        Criticality::NonCritical
    }

    async fn execute(&self, ctx: &StepContext, _state: &mut JobState) -> Result<StepOutcome> {
        let mut inserted = 0u64;
        for descriptor in StepCatalog::main().default_descriptors() {
            let optional = descriptor.non_critical.then_some(crate::registry::OPTIONAL_MARKER);
            let statement = Statement::new(SEED_COMMON_CODE)
                .bind(MAIN_STEP_GROUP)
                .bind(descriptor.key.as_str())
                .bind(descriptor.name.as_str())
                .bind(descriptor.sort_order)
                .bind(optional)
                .bind(descriptor.description.clone())
                .bind(MAIN_STEP_GROUP)
                .bind(descriptor.key.as_str());
            inserted += ctx.collaborators.database.execute(&statement).await?;
        }
        info!(inserted, group = MAIN_STEP_GROUP, "Seeded step configuration");
        Ok(StepOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{step_context, FakeDatabase};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_seed_inserts_one_row_per_main_step() {
        let db = Arc::new(FakeDatabase::new());
        let ctx = step_context().with_database(db.clone()).build();

        SeedCodeTable.execute(&ctx, &mut JobState::default()).await.unwrap();

        let seeds = db.statements_matching("INSERT INTO CommonCode");
        assert_eq!(seeds.len(), StepCatalog::main().len());
        assert_eq!(seeds[0].params[1], serde_json::json!("read_spreadsheet"));
    }

    #[tokio::test]
    async fn test_ensure_table_propagates_database_error() {
        let db = Arc::new(FakeDatabase::new().fail_on("CREATE TABLE"));
        let ctx = step_context().with_database(db).build();

        let err = EnsureCodeTable
            .execute(&ctx, &mut JobState::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("database execute failed"));
    }
}
