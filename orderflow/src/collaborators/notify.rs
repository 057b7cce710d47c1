//! Chat notification contract.

use crate::errors::OrderflowError;
use async_trait::async_trait;

/// Chat notification service.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announces that an invoice file is ready.
    async fn send_invoice_notification(
        &self,
        batch_label: &str,
        batch_id: i64,
        record_count: usize,
        file_url: &str,
    ) -> Result<(), OrderflowError>;

    /// Returns whether the service is reachable.
    async fn test_connection(&self) -> bool;
}
