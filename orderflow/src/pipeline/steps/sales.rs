//! Sales input sub-pipeline steps.

use crate::collaborators::{DbRow, Statement};
use crate::errors::{Result, ValidationError};
use crate::pipeline::{JobState, Step, StepContext, StepOutcome};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

const SELECT_PENDING_SALES: &str = "SELECT SalesOrderId, OrderNo, ProductCode, Quantity, Amount
FROM SalesOrder
WHERE Processed = 0
ORDER BY SalesOrderId";

const INSERT_SALES_INPUT: &str = "INSERT INTO SalesInput
    (SalesOrderId, BusinessDate, BatchLabel, OrderNo, ProductCode, Quantity, Amount)
VALUES (?, ?, ?, ?, ?, ?, ?)";

fn column(row: &DbRow, name: &str) -> Value {
    row.get(name).cloned().unwrap_or(Value::Null)
}

fn sales_order_id(row: &DbRow) -> Result<i64> {
    row.get("SalesOrderId")
        .and_then(Value::as_i64)
        .ok_or_else(|| ValidationError::new("sales order row without a numeric SalesOrderId").into())
}

/// Picks up sales orders that have not been processed yet.
#[derive(Debug, Default)]
pub struct CollectSalesOrders;

#[async_trait]
impl Step for CollectSalesOrders {
    fn key(&self) -> &str {
        "collect_sales_orders"
    }

    fn name(&self) -> &str {
        "Collect pending sales orders"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let rows = ctx
            .collaborators
            .database
            .query(&Statement::new(SELECT_PENDING_SALES))
            .await?;
        if rows.is_empty() {
            return Ok(StepOutcome::no_data("no pending sales orders"));
        }
        info!(pending = rows.len(), "Collected sales orders");
        state.sales_orders = rows;
        Ok(StepOutcome::Continue)
    }
}

/// Copies pending sales orders into the sales input table.
#[derive(Debug, Default)]
pub struct InsertSalesInput;

#[async_trait]
impl Step for InsertSalesInput {
    fn key(&self) -> &str {
        "insert_sales_input"
    }

    fn name(&self) -> &str {
        "Insert sales input"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let db = &ctx.collaborators.database;
        for row in &state.sales_orders {
            let statement = Statement::new(INSERT_SALES_INPUT)
                .bind(sales_order_id(row)?)
                .bind(ctx.slot.business_date.to_string())
                .bind(ctx.slot.batch.label.as_str())
                .bind(column(row, "OrderNo"))
                .bind(column(row, "ProductCode"))
                .bind(column(row, "Quantity"))
                .bind(column(row, "Amount"));
            state.sales_inserted += db.execute(&statement).await?;
        }
        info!(inserted = state.sales_inserted, "Sales input written");
        Ok(StepOutcome::Continue)
    }
}

/// Flags the collected sales orders as processed.
#[derive(Debug, Default)]
pub struct MarkSalesProcessed;

#[async_trait]
impl Step for MarkSalesProcessed {
    fn key(&self) -> &str {
        "mark_sales_processed"
    }

    fn name(&self) -> &str {
        "Mark sales orders processed"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        if state.sales_orders.is_empty() {
            return Ok(StepOutcome::Continue);
        }
        let ids = state
            .sales_orders
            .iter()
            .map(sales_order_id)
            .collect::<Result<Vec<_>>>()?;

        let placeholders = vec!["?"; ids.len()].join(", ");
        let statement = ids.into_iter().fold(
            Statement::new(format!(
                "UPDATE SalesOrder SET Processed = 1 WHERE SalesOrderId IN ({placeholders})"
            )),
            Statement::bind,
        );
        let marked = ctx.collaborators.database.execute(&statement).await?;
        info!(marked, "Sales orders marked processed");
        Ok(StepOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{step_context, FakeDatabase};
    use serde_json::json;
    use std::sync::Arc;

    fn sales_row(id: i64) -> DbRow {
        [
            ("SalesOrderId".to_string(), json!(id)),
            ("OrderNo".to_string(), json!(format!("S-{id}"))),
            ("ProductCode".to_string(), json!("P-01")),
            ("Quantity".to_string(), json!(2)),
            ("Amount".to_string(), json!(12000)),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_no_pending_sales_is_no_data() {
        let ctx = step_context().build();
        let outcome = CollectSalesOrders
            .execute(&ctx, &mut JobState::default())
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::no_data("no pending sales orders"));
    }

    #[tokio::test]
    async fn test_mark_binds_every_id() {
        let db = Arc::new(FakeDatabase::new());
        let ctx = step_context().with_database(db.clone()).build();
        let mut state = JobState {
            sales_orders: vec![sales_row(4), sales_row(5)],
            ..JobState::default()
        };

        InsertSalesInput.execute(&ctx, &mut state).await.unwrap();
        MarkSalesProcessed.execute(&ctx, &mut state).await.unwrap();

        assert_eq!(state.sales_inserted, 2);
        let update = db.statements_matching("UPDATE SalesOrder");
        assert_eq!(update.len(), 1);
        assert!(update[0].sql.ends_with("IN (?, ?)"));
        assert_eq!(update[0].params, vec![json!(4), json!(5)]);
    }

    #[tokio::test]
    async fn test_row_without_id_is_rejected() {
        let ctx = step_context().build();
        let mut row = sales_row(1);
        row.remove("SalesOrderId");
        let mut state = JobState {
            sales_orders: vec![row],
            ..JobState::default()
        };

        assert!(InsertSalesInput.execute(&ctx, &mut state).await.is_err());
    }
}
