//! In-memory collaborators.

use crate::collaborators::{
    DbRow, FileStorage, Notifier, RelationalStore, SheetRow, SpreadsheetReader, SpreadsheetWriter, Statement,
    UploadResult,
};
use crate::errors::{CollaboratorError, FileFormatError, OrderflowError, Service};
use crate::registry::{CommonCode, ConfigStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

fn injected(service: Service, operation: &str, what: &str) -> OrderflowError {
    CollaboratorError::new(service, operation, format!("injected failure for '{what}'"))
        .with_source(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset by peer"))
        .into()
}

#[derive(Debug, Clone)]
enum SheetContent {
    Rows(Vec<SheetRow>),
    Malformed(String),
}

/// A spreadsheet reader serving fixed rows.
#[derive(Debug)]
pub struct FakeSpreadsheet {
    content: SheetContent,
    reads: AtomicUsize,
}

impl Default for FakeSpreadsheet {
    fn default() -> Self {
        Self::with_rows(Vec::new())
    }
}

impl FakeSpreadsheet {
    /// Serves `rows` for every path.
    #[must_use]
    pub fn with_rows(rows: Vec<SheetRow>) -> Self {
        Self {
            content: SheetContent::Rows(rows),
            reads: AtomicUsize::new(0),
        }
    }

    /// Fails every read with a file format error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            content: SheetContent::Malformed(reason.into()),
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of reads so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpreadsheetReader for FakeSpreadsheet {
    async fn read_rows(&self, path: &Path) -> Result<Vec<SheetRow>, OrderflowError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match &self.content {
            SheetContent::Rows(rows) => Ok(rows.clone()),
            SheetContent::Malformed(reason) => {
                Err(FileFormatError::new(path.display().to_string(), reason.clone()).into())
            }
        }
    }
}

/// A sheet captured by [`FakeWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenSheet {
    /// Target path.
    pub path: PathBuf,
    /// Header row.
    pub headers: Vec<String>,
    /// Data rows.
    pub rows: Vec<Vec<String>>,
}

/// A spreadsheet writer that records instead of writing.
#[derive(Debug, Default)]
pub struct FakeWriter {
    writes: Mutex<Vec<WrittenSheet>>,
}

impl FakeWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sheets written so far.
    #[must_use]
    pub fn writes(&self) -> Vec<WrittenSheet> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl SpreadsheetWriter for FakeWriter {
    async fn write_rows(&self, path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<(), OrderflowError> {
        self.writes.lock().push(WrittenSheet {
            path: path.to_path_buf(),
            headers: headers.to_vec(),
            rows: rows.to_vec(),
        });
        Ok(())
    }
}

/// A relational store that records statements and answers from canned rules.
///
/// Rules match when the statement's SQL contains the given fragment; the
/// first matching rule wins. Unmatched `execute` calls affect one row and
/// unmatched queries return no rows.
#[derive(Debug, Default)]
pub struct FakeDatabase {
    statements: Mutex<Vec<Statement>>,
    executes: AtomicUsize,
    affected: Vec<(String, u64)>,
    responses: Vec<(String, Vec<DbRow>)>,
    failures: Vec<String>,
}

impl FakeDatabase {
    /// Creates a database with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes statements containing `fragment` report `rows` affected rows.
    #[must_use]
    pub fn with_affected(mut self, fragment: impl Into<String>, rows: u64) -> Self {
        self.affected.push((fragment.into(), rows));
        self
    }

    /// Makes queries containing `fragment` return `rows`.
    #[must_use]
    pub fn with_query_rows(mut self, fragment: impl Into<String>, rows: Vec<DbRow>) -> Self {
        self.responses.push((fragment.into(), rows));
        self
    }

    /// Answers batch id lookups with `batch_id`.
    #[must_use]
    pub fn with_batch_id(self, batch_id: i64) -> Self {
        let row: DbRow = std::iter::once(("BatchId".to_string(), json!(batch_id))).collect();
        self.with_query_rows("FROM OrderBatch", vec![row])
    }

    /// Fails every statement containing `fragment`.
    #[must_use]
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.failures.push(fragment.into());
        self
    }

    /// Every statement seen, executes and queries, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    /// Statements whose SQL contains `fragment`.
    #[must_use]
    pub fn statements_matching(&self, fragment: &str) -> Vec<Statement> {
        self.statements
            .lock()
            .iter()
            .filter(|s| s.sql.contains(fragment))
            .cloned()
            .collect()
    }

    /// Number of `execute` calls, including failed ones.
    #[must_use]
    pub fn execute_count(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    fn record(&self, statement: &Statement, operation: &str) -> Result<(), OrderflowError> {
        self.statements.lock().push(statement.clone());
        match self.failures.iter().find(|f| statement.sql.contains(f.as_str())) {
            Some(fragment) => Err(injected(Service::Database, operation, fragment)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RelationalStore for FakeDatabase {
    async fn execute(&self, statement: &Statement) -> Result<u64, OrderflowError> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.record(statement, "execute")?;
        Ok(self
            .affected
            .iter()
            .find(|(fragment, _)| statement.sql.contains(fragment.as_str()))
            .map_or(1, |(_, rows)| *rows))
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<DbRow>, OrderflowError> {
        self.record(statement, "query")?;
        Ok(self
            .responses
            .iter()
            .find(|(fragment, _)| statement.sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

/// File storage that remembers uploads.
#[derive(Debug, Default)]
pub struct FakeStorage {
    uploads: Mutex<Vec<(PathBuf, String)>>,
    failing: bool,
}

impl FakeStorage {
    /// Creates a working storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage whose uploads fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// `(local, remote_folder)` of every successful upload.
    #[must_use]
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().clone()
    }

    fn remote_path(local: &Path, folder: &str) -> String {
        let file = local
            .file_name()
            .map_or_else(|| "upload".to_string(), |f| f.to_string_lossy().into_owned());
        format!("{folder}/{file}")
    }
}

#[async_trait]
impl FileStorage for FakeStorage {
    async fn upload(&self, local: &Path, remote_folder: &str) -> Result<UploadResult, OrderflowError> {
        if self.failing {
            return Err(injected(Service::Storage, "upload", &local.display().to_string()));
        }
        self.uploads.lock().push((local.to_path_buf(), remote_folder.to_string()));
        let remote_path = Self::remote_path(local, remote_folder);
        Ok(UploadResult {
            remote_url: format!("https://storage.example/{remote_path}"),
            remote_path,
        })
    }

    /// Reports whether `remote` was uploaded earlier; no bytes are written.
    async fn download(&self, remote: &str, _local: &Path) -> Result<bool, OrderflowError> {
        Ok(self
            .uploads
            .lock()
            .iter()
            .any(|(local, folder)| Self::remote_path(local, folder) == remote))
    }
}

/// A notification captured by [`FakeNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    /// Batch label.
    pub batch_label: String,
    /// Batch id.
    pub batch_id: i64,
    /// Number of orders in the invoice.
    pub record_count: usize,
    /// Link to the invoice file.
    pub file_url: String,
}

/// A notifier that records messages.
#[derive(Debug)]
pub struct FakeNotifier {
    reachable: bool,
    rejects_send: bool,
    sent: Mutex<Vec<SentNotification>>,
}

impl Default for FakeNotifier {
    fn default() -> Self {
        Self {
            reachable: true,
            rejects_send: false,
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl FakeNotifier {
    /// A reachable notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose connection test fails.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::default()
        }
    }

    /// A notifier that passes the connection test but fails every send.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            rejects_send: true,
            ..Self::default()
        }
    }

    /// Notifications sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_invoice_notification(
        &self,
        batch_label: &str,
        batch_id: i64,
        record_count: usize,
        file_url: &str,
    ) -> Result<(), OrderflowError> {
        if !self.reachable || self.rejects_send {
            return Err(injected(Service::Notification, "send", batch_label));
        }
        self.sent.lock().push(SentNotification {
            batch_label: batch_label.to_string(),
            batch_id,
            record_count,
            file_url: file_url.to_string(),
        });
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.reachable
    }
}

/// A configuration store over a fixed list of rows.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    codes: Vec<CommonCode>,
    unavailable: bool,
}

impl InMemoryConfigStore {
    /// Serves `codes`.
    #[must_use]
    pub fn new(codes: Vec<CommonCode>) -> Self {
        Self {
            codes,
            unavailable: false,
        }
    }

    /// A store whose every call fails.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            codes: Vec::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn codes(&self, group: &str) -> Result<Vec<CommonCode>, OrderflowError> {
        if self.unavailable {
            return Err(injected(Service::ConfigStore, "codes", group));
        }
        Ok(self
            .codes
            .iter()
            .filter(|c| c.group_code == group)
            .cloned()
            .collect())
    }
}
