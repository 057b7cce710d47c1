//! Ready-made contexts, services and rows.

use super::{FakeDatabase, FakeNotifier, FakeSpreadsheet, FakeStorage, FakeWriter};
use crate::batch::{BatchClassifier, BatchSlot, FixedClock};
use crate::collaborators::{
    Collaborators, FileStorage, Notifier, RelationalStore, SheetRow, SpreadsheetReader, SpreadsheetWriter,
};
use crate::config::PipelineConfig;
use crate::pipeline::steps::{COL_ADDRESS, COL_ORDER_NO, COL_PHONE, COL_PRODUCT, COL_QUANTITY, COL_RECIPIENT};
use crate::pipeline::StepContext;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// 2024-03-01 08:30, inside batch "2차".
#[must_use]
pub fn fixture_now() -> NaiveDateTime {
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default();
    let time = NaiveTime::from_hms_opt(8, 30, 0).unwrap_or_default();
    date.and_time(time)
}

/// A classifier frozen at [`fixture_now`].
#[must_use]
pub fn fixture_classifier() -> BatchClassifier {
    BatchClassifier::with_clock(Arc::new(FixedClock::new(fixture_now())))
}

/// A complete order row.
#[must_use]
pub fn order_row(line: usize, order_no: &str, product: &str, quantity: &str) -> SheetRow {
    SheetRow::new(line)
        .with_cell(COL_ORDER_NO, order_no)
        .with_cell(COL_RECIPIENT, "홍길동")
        .with_cell(COL_PHONE, "010 1234 5678")
        .with_cell(COL_ADDRESS, "서울시  강남구   테헤란로 1")
        .with_cell(COL_PRODUCT, product)
        .with_cell(COL_QUANTITY, quantity)
}

/// One fake of every collaborator, kept as concrete handles for assertions.
#[derive(Debug, Clone)]
pub struct FakeServices {
    /// Spreadsheet reader.
    pub reader: Arc<FakeSpreadsheet>,
    /// Spreadsheet writer.
    pub writer: Arc<FakeWriter>,
    /// Database.
    pub database: Arc<FakeDatabase>,
    /// File storage.
    pub storage: Arc<FakeStorage>,
    /// Notifier.
    pub notifier: Arc<FakeNotifier>,
}

impl Default for FakeServices {
    fn default() -> Self {
        Self {
            reader: Arc::new(FakeSpreadsheet::default()),
            writer: Arc::new(FakeWriter::new()),
            database: Arc::new(FakeDatabase::new().with_batch_id(1)),
            storage: Arc::new(FakeStorage::new()),
            notifier: Arc::new(FakeNotifier::new()),
        }
    }
}

impl FakeServices {
    /// Default fakes; the database knows batch id 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the reader.
    #[must_use]
    pub fn with_reader(mut self, reader: FakeSpreadsheet) -> Self {
        self.reader = Arc::new(reader);
        self
    }

    /// Replaces the database.
    #[must_use]
    pub fn with_database(mut self, database: FakeDatabase) -> Self {
        self.database = Arc::new(database);
        self
    }

    /// Replaces the storage.
    #[must_use]
    pub fn with_storage(mut self, storage: FakeStorage) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: FakeNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// The fakes as a collaborator bundle.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            reader: self.reader.clone(),
            writer: self.writer.clone(),
            database: self.database.clone(),
            storage: self.storage.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

/// Builder for a [`StepContext`] backed by fakes.
#[derive(Debug)]
pub struct StepContextBuilder {
    collaborators: Collaborators,
    config: PipelineConfig,
    slot: BatchSlot,
    spreadsheet_path: Option<PathBuf>,
}

/// Starts a [`StepContextBuilder`] with default fakes, batch "2차" of
/// 2024-03-01 and a spreadsheet path of `orders.xlsx`.
#[must_use]
pub fn step_context() -> StepContextBuilder {
    StepContextBuilder {
        collaborators: FakeServices::new().collaborators(),
        config: PipelineConfig::default(),
        slot: fixture_classifier().current_slot(),
        spreadsheet_path: Some(PathBuf::from("orders.xlsx")),
    }
}

impl StepContextBuilder {
    /// Replaces the reader.
    #[must_use]
    pub fn with_reader(mut self, reader: Arc<dyn SpreadsheetReader>) -> Self {
        self.collaborators.reader = reader;
        self
    }

    /// Replaces the writer.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn SpreadsheetWriter>) -> Self {
        self.collaborators.writer = writer;
        self
    }

    /// Replaces the database.
    #[must_use]
    pub fn with_database(mut self, database: Arc<dyn RelationalStore>) -> Self {
        self.collaborators.database = database;
        self
    }

    /// Replaces the storage.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn FileStorage>) -> Self {
        self.collaborators.storage = storage;
        self
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.collaborators.notifier = notifier;
        self
    }

    /// Sets the work directory.
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_work_dir(dir);
        self
    }

    /// Drops the spreadsheet path, as in the sales sub-pipeline.
    #[must_use]
    pub fn without_spreadsheet(mut self) -> Self {
        self.spreadsheet_path = None;
        self
    }

    /// Builds the context with a fresh run id.
    #[must_use]
    pub fn build(self) -> StepContext {
        StepContext {
            run_id: Uuid::now_v7(),
            spreadsheet_path: self.spreadsheet_path,
            slot: self.slot,
            config: self.config,
            collaborators: self.collaborators,
        }
    }
}
