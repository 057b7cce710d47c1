//! Spreadsheet reading and writing.

use crate::errors::OrderflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One data row of a spreadsheet, keyed by header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRow {
    /// 1-based sheet line, header included (the first data row is line 2).
    pub line: usize,
    /// Cell values by header.
    pub cells: BTreeMap<String, String>,
}

impl SheetRow {
    /// Creates an empty row at `line`.
    #[must_use]
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: BTreeMap::new(),
        }
    }

    /// Adds a cell.
    #[must_use]
    pub fn with_cell(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
        self.cells.insert(header.into(), value.into());
        self
    }

    /// Returns a cell value, if present.
    #[must_use]
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells.get(header).map(String::as_str)
    }

    /// Returns true if every cell is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

/// Reads order rows from a spreadsheet file.
#[async_trait]
pub trait SpreadsheetReader: Send + Sync {
    /// Returns the data rows of the first sheet.
    ///
    /// Fails with a file format error when headers are missing or malformed.
    async fn read_rows(&self, path: &Path) -> Result<Vec<SheetRow>, OrderflowError>;
}

/// Writes a sheet of rows to a file.
#[async_trait]
pub trait SpreadsheetWriter: Send + Sync {
    /// Writes `rows` under `headers` to `path`, replacing the file.
    async fn write_rows(
        &self,
        path: &Path,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), OrderflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_row() {
        assert!(SheetRow::new(2).with_cell("수량", "  ").is_blank());
        assert!(!SheetRow::new(2).with_cell("수량", "1").is_blank());
        assert_eq!(SheetRow::new(2).with_cell("수량", "1").get("수량"), Some("1"));
    }
}
