//! Invoice export, upload and notification.

use super::intake::{COL_ADDRESS, COL_MEMO, COL_ORDER_NO, COL_PHONE, COL_PRODUCT, COL_QUANTITY, COL_RECIPIENT};
use crate::errors::{InvalidStateError, Result};
use crate::pipeline::{JobState, Step, StepContext, StepOutcome};
use async_trait::async_trait;
use tracing::{info, warn};

/// Column order of the exported invoice sheet.
pub const INVOICE_HEADERS: [&str; 7] = [
    COL_ORDER_NO,
    COL_RECIPIENT,
    COL_PHONE,
    COL_ADDRESS,
    COL_PRODUCT,
    COL_QUANTITY,
    COL_MEMO,
];

/// Writes the batch's records to an invoice sheet in the work directory.
#[derive(Debug, Default)]
pub struct ExportInvoiceFile;

#[async_trait]
impl Step for ExportInvoiceFile {
    fn key(&self) -> &str {
        "export_invoice_file"
    }

    fn name(&self) -> &str {
        "Export invoice file"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
        let path = ctx
            .config
            .work_dir
            .join(format!("invoice_{}.xlsx", ctx.slot.batch_key()));

        let headers: Vec<String> = INVOICE_HEADERS.iter().map(ToString::to_string).collect();
        let rows: Vec<Vec<String>> = state
            .records
            .iter()
            .map(|r| {
                vec![
                    r.order_no.clone(),
                    r.recipient.clone(),
                    r.phone.clone(),
                    r.address.clone(),
                    r.product.clone(),
                    r.quantity.to_string(),
                    r.memo.clone().unwrap_or_default(),
                ]
            })
            .collect();

        ctx.collaborators.writer.write_rows(&path, &headers, &rows).await?;
        info!(path = %path.display(), rows = rows.len(), "Invoice file written");
        state.export_path = Some(path);
        Ok(StepOutcome::Continue)
    }
}

/// Uploads the invoice file to `<remote_folder>/<business date>`.
#[derive(Debug, Default)]
pub struct UploadInvoiceFile;

#[async_trait]
impl Step for UploadInvoiceFile {
    fn key(&self) -> &str {
        "upload_invoice_file"
    }

    fn name(&self) -> &str {
        "Upload invoice file"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let Some(local) = state.export_path.clone() else {
            return Err(InvalidStateError::new(
                "upload_invoice_file",
                "exported invoice file",
                "nothing exported",
            )
            .into());
        };
        let folder = format!(
            "{}/{}",
            ctx.config.remote_folder.trim_end_matches('/'),
            ctx.slot.business_date.format("%Y-%m-%d")
        );

        let upload = ctx.collaborators.storage.upload(&local, &folder).await?;
        info!(remote_url = %upload.remote_url, remote_path = %upload.remote_path, "Invoice uploaded");
        state.upload = Some(upload);
        Ok(StepOutcome::Continue)
    }
}

/// Announces the uploaded invoice in the chat channel.
///
/// An unreachable notification service or a rejected message is a warning,
/// not a failure: the invoice is already uploaded by then.
#[derive(Debug, Default)]
pub struct NotifyInvoice;

#[async_trait]
impl Step for NotifyInvoice {
    fn key(&self) -> &str {
        "notify_invoice"
    }

    fn name(&self) -> &str {
        "Send invoice notification"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let batch_id = state.batch_id()?;
        let url = state.upload()?.remote_url.clone();
        let notifier = &ctx.collaborators.notifier;

        if !notifier.test_connection().await {
            state.warn(format!(
                "notification service unreachable; batch '{}' was not announced",
                ctx.slot.batch.label
            ));
            return Ok(StepOutcome::Continue);
        }

        match notifier
            .send_invoice_notification(&ctx.slot.batch.label, batch_id, state.records.len(), &url)
            .await
        {
            Ok(()) => state.notified = true,
            Err(err) => {
                warn!(error = %err, batch = %ctx.slot.batch.label, "Invoice notification failed");
                state.warn(format!(
                    "notification for batch '{}' failed: {err}",
                    ctx.slot.batch.label
                ));
            }
        }
        Ok(StepOutcome::Continue)
    }
}
