//! Cloud file storage contract.

use crate::errors::OrderflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Shareable URL.
    pub remote_url: String,
    /// Path inside the storage account.
    pub remote_path: String,
}

/// Cloud file storage.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Uploads a local file into `remote_folder`.
    async fn upload(&self, local: &Path, remote_folder: &str) -> Result<UploadResult, OrderflowError>;

    /// Downloads `remote` to `local`; returns false if the remote file does not exist.
    async fn download(&self, remote: &str, local: &Path) -> Result<bool, OrderflowError>;
}
