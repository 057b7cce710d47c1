//! Batch registration and order rows in the database.

use crate::collaborators::Statement;
use crate::errors::{CollaboratorError, Result, Service};
use crate::pipeline::{JobState, Step, StepContext, StepOutcome};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

const REGISTER_BATCH: &str = "INSERT INTO OrderBatch (BatchKey, BatchLabel, BusinessDate, Status, CreatedAt)
SELECT ?, ?, ?, 'PROCESSING', ?
WHERE NOT EXISTS (SELECT 1 FROM OrderBatch WHERE BatchKey = ?)";

const REOPEN_BATCH: &str = "UPDATE OrderBatch SET Status = 'PROCESSING', UpdatedAt = ? WHERE BatchKey = ?";

const SELECT_BATCH_ID: &str = "SELECT BatchId FROM OrderBatch WHERE BatchKey = ?";

const DELETE_BATCH_ORDERS: &str = "DELETE FROM OrderLine WHERE BatchId = ?";

const INSERT_ORDER: &str = "INSERT INTO OrderLine
    (BatchId, SheetLine, OrderNo, Recipient, Phone, Address, ProductName, Quantity, Memo)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

const MAP_PRODUCTS: &str = "UPDATE OrderLine
SET ProductCode = (SELECT m.ProductCode FROM ProductMapping m WHERE m.SourceName = OrderLine.ProductName)
WHERE BatchId = ?
  AND EXISTS (SELECT 1 FROM ProductMapping m WHERE m.SourceName = OrderLine.ProductName)";

const COMPLETE_BATCH: &str = "UPDATE OrderBatch
SET Status = 'COMPLETED', OrderCount = ?, InvoiceUrl = ?, UpdatedAt = ?
WHERE BatchId = ?";

fn now_param() -> String {
    Utc::now().to_rfc3339()
}

/// Registers the batch under its natural key and reads back its id.
///
/// Re-running the same batch reuses the existing row.
#[derive(Debug, Default)]
pub struct RegisterBatch;

#[async_trait]
impl Step for RegisterBatch {
    fn key(&self) -> &str {
        "register_batch"
    }

    fn name(&self) -> &str {
        "Register batch"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let db = &ctx.collaborators.database;
        let batch_key = ctx.slot.batch_key();

        let inserted = db
            .execute(
                &Statement::new(REGISTER_BATCH)
                    .bind(batch_key.as_str())
                    .bind(ctx.slot.batch.label.as_str())
                    .bind(ctx.slot.business_date.to_string())
                    .bind(now_param())
                    .bind(batch_key.as_str()),
            )
            .await?;
        if inserted == 0 {
            db.execute(&Statement::new(REOPEN_BATCH).bind(now_param()).bind(batch_key.as_str()))
                .await?;
            info!(batch_key = %batch_key, "Batch already registered, re-running");
        }

        let rows = db
            .query(&Statement::new(SELECT_BATCH_ID).bind(batch_key.as_str()))
            .await?;
        let batch_id = rows
            .first()
            .and_then(|row| row.get("BatchId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                CollaboratorError::new(
                    Service::Database,
                    "query",
                    format!("batch '{batch_key}' has no BatchId after registration"),
                )
            })?;

        debug!(batch_key = %batch_key, batch_id, "Batch registered");
        state.batch_id = Some(batch_id);
        Ok(StepOutcome::Continue)
    }
}

/// Deletes order rows left by an earlier run of the same batch.
#[derive(Debug, Default)]
pub struct ClearBatchOrders;

#[async_trait]
impl Step for ClearBatchOrders {
    fn key(&self) -> &str {
        "clear_batch_orders"
    }

    fn name(&self) -> &str {
        "Clear previous batch orders"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let batch_id = state.batch_id()?;
        let removed = ctx
            .collaborators
            .database
            .execute(&Statement::new(DELETE_BATCH_ORDERS).bind(batch_id))
            .await?;
        if removed > 0 {
            info!(batch_id, removed, "Removed order rows from a previous run");
        }
        Ok(StepOutcome::Continue)
    }
}

/// Inserts one order row per record.
#[derive(Debug, Default)]
pub struct InsertOrders;

#[async_trait]
impl Step for InsertOrders {
    fn key(&self) -> &str {
        "insert_orders"
    }

    fn name(&self) -> &str {
        "Insert orders"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let batch_id = state.batch_id()?;
        let db = &ctx.collaborators.database;

        for record in &state.records {
            let statement = Statement::new(INSERT_ORDER)
                .bind(batch_id)
                .bind(record.line)
                .bind(record.order_no.as_str())
                .bind(record.recipient.as_str())
                .bind(record.phone.as_str())
                .bind(record.address.as_str())
                .bind(record.product.as_str())
                .bind(record.quantity)
                .bind(record.memo.clone());
            db.execute(&statement).await?;
            state.inserted_orders += 1;
        }

        info!(batch_id, inserted = state.inserted_orders, "Inserted orders");
        Ok(StepOutcome::Continue)
    }
}

/// Applies the product mapping table to the batch.
#[derive(Debug, Default)]
pub struct MapProducts;

#[async_trait]
impl Step for MapProducts {
    fn key(&self) -> &str {
        "map_products"
    }

    fn name(&self) -> &str {
        "Map products"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let batch_id = state.batch_id()?;
        let mapped = ctx
            .collaborators
            .database
            .execute(&Statement::new(MAP_PRODUCTS).bind(batch_id))
            .await?;
        state.mapped_products = mapped;

        let unmapped = (state.inserted_orders as u64).saturating_sub(mapped);
        if unmapped > 0 {
            state.warn(format!(
                "{unmapped} of {} order lines have no product mapping",
                state.inserted_orders
            ));
        }
        Ok(StepOutcome::Continue)
    }
}

/// Marks the batch completed with its order count and invoice link.
#[derive(Debug, Default)]
pub struct CompleteBatch;

#[async_trait]
impl Step for CompleteBatch {
    fn key(&self) -> &str {
        "complete_batch"
    }

    fn name(&self) -> &str {
        "Complete batch"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let batch_id = state.batch_id()?;
        let invoice_url = state.upload.as_ref().map(|u| u.remote_url.clone());
        ctx.collaborators
            .database
            .execute(
                &Statement::new(COMPLETE_BATCH)
                    .bind(state.records.len())
                    .bind(invoice_url)
                    .bind(now_param())
                    .bind(batch_id),
            )
            .await?;
        info!(batch_id, orders = state.records.len(), "Batch completed");
        Ok(StepOutcome::Continue)
    }
}
