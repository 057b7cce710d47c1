//! Contracts with the services the pipeline drives.
//!
//! Implementations live outside this crate; in-memory versions for tests are
//! in [`crate::testing`].

mod database;
mod notify;
mod sheet;
mod storage;

pub use database::{DbRow, RelationalStore, Statement};
pub use notify::Notifier;
pub use sheet::{SheetRow, SpreadsheetReader, SpreadsheetWriter};
pub use storage::{FileStorage, UploadResult};

use std::fmt;
use std::sync::Arc;

/// The set of collaborators a run uses.
#[derive(Clone)]
pub struct Collaborators {
    /// Reads the input spreadsheet.
    pub reader: Arc<dyn SpreadsheetReader>,
    /// Writes the invoice spreadsheet.
    pub writer: Arc<dyn SpreadsheetWriter>,
    /// The relational database.
    pub database: Arc<dyn RelationalStore>,
    /// Cloud file storage.
    pub storage: Arc<dyn FileStorage>,
    /// Chat notifications.
    pub notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
