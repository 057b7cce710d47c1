//! Reading, validating and cleaning spreadsheet rows.

use crate::collaborators::SheetRow;
use crate::errors::{OrderflowError, Result, ValidationError};
use crate::pipeline::{JobState, OrderRecord, Step, StepContext, StepOutcome};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info};

/// Order number column.
pub const COL_ORDER_NO: &str = "주문번호";
/// Recipient column.
pub const COL_RECIPIENT: &str = "수령인";
/// Phone column.
pub const COL_PHONE: &str = "연락처";
/// Address column.
pub const COL_ADDRESS: &str = "주소";
/// Product column.
pub const COL_PRODUCT: &str = "상품명";
/// Quantity column.
pub const COL_QUANTITY: &str = "수량";
/// Optional delivery memo column.
pub const COL_MEMO: &str = "배송메모";

/// Columns every data row must fill.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    COL_ORDER_NO,
    COL_RECIPIENT,
    COL_PHONE,
    COL_ADDRESS,
    COL_PRODUCT,
    COL_QUANTITY,
];

/// Reads the input spreadsheet. An empty sheet ends the run with `NoData`.
#[derive(Debug, Default)]
pub struct ReadSpreadsheet;

#[async_trait]
impl Step for ReadSpreadsheet {
    fn key(&self) -> &str {
        "read_spreadsheet"
    }

    fn name(&self) -> &str {
        "Read order spreadsheet"
    }

    async fn execute(&self, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let path = ctx.spreadsheet_path()?;
        let rows: Vec<SheetRow> = ctx
            .collaborators
            .reader
            .read_rows(path)
            .await?
            .into_iter()
            .filter(|row| !row.is_blank())
            .collect();

        if rows.is_empty() {
            return Ok(StepOutcome::no_data(format!(
                "'{}' has no order rows",
                path.display()
            )));
        }

        info!(path = %path.display(), rows = rows.len(), "Read spreadsheet");
        state.rows = rows;
        Ok(StepOutcome::Continue)
    }
}

/// Checks required fields and quantities and builds typed records.
#[derive(Debug, Default)]
pub struct ValidateRows;

impl ValidateRows {
    fn record(row: &SheetRow) -> std::result::Result<OrderRecord, Vec<String>> {
        let mut problems = Vec::new();
        let field = |header: &str, problems: &mut Vec<String>| -> String {
            let value = row.get(header).map(str::trim).unwrap_or_default();
            if value.is_empty() {
                problems.push(format!("line {}: missing {header}", row.line));
            }
            value.to_string()
        };

        let order_no = field(COL_ORDER_NO, &mut problems);
        let recipient = field(COL_RECIPIENT, &mut problems);
        let phone = field(COL_PHONE, &mut problems);
        let address = field(COL_ADDRESS, &mut problems);
        let product = field(COL_PRODUCT, &mut problems);
        let raw_quantity = field(COL_QUANTITY, &mut problems);

        let quantity = if raw_quantity.is_empty() {
            0
        } else {
            match raw_quantity.replace(',', "").parse::<u32>() {
                Ok(q) if q > 0 => q,
                _ => {
                    problems.push(format!(
                        "line {}: {COL_QUANTITY} '{raw_quantity}' is not a positive whole number",
                        row.line
                    ));
                    0
                }
            }
        };

        if !problems.is_empty() {
            return Err(problems);
        }

        let memo = row
            .get(COL_MEMO)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        Ok(OrderRecord {
            line: row.line,
            order_no,
            recipient,
            phone,
            address,
            product,
            quantity,
            memo,
            source_lines: vec![row.line],
        })
    }
}

#[async_trait]
impl Step for ValidateRows {
    fn key(&self) -> &str {
        "validate_rows"
    }

    fn name(&self) -> &str {
        "Validate order rows"
    }

    async fn execute(&self, _ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let mut records = Vec::with_capacity(state.rows.len());
        let mut details = Vec::new();
        let mut bad_rows = 0usize;

        for row in &state.rows {
            match Self::record(row) {
                Ok(record) => records.push(record),
                Err(problems) => {
                    bad_rows += 1;
                    details.extend(problems);
                }
            }
        }

        if bad_rows > 0 {
            return Err(ValidationError::new(format!(
                "{bad_rows} of {} rows failed validation",
                state.rows.len()
            ))
            .with_details(details)
            .into());
        }

        debug!(records = records.len(), "Rows validated");
        state.records = records;
        Ok(StepOutcome::Continue)
    }
}

/// Whitespace and phone number normalisation.
#[derive(Debug)]
struct Normalizer {
    whitespace: Regex,
    non_digit: Regex,
}

impl Normalizer {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| OrderflowError::internal(format!("invalid pattern '{pattern}': {e}")))
        };
        Ok(Self {
            whitespace: compile(r"\s+")?,
            non_digit: compile(r"\D")?,
        })
    }

    fn text(&self, value: &str) -> String {
        self.whitespace.replace_all(value.trim(), " ").into_owned()
    }

    /// Formats domestic numbers as `010-1234-5678` / `02-123-4567`.
    /// Numbers that do not look domestic are returned as bare digits.
    fn phone(&self, value: &str) -> String {
        let mut digits = self.non_digit.replace_all(value, "").into_owned();
        if let Some(rest) = digits.strip_prefix("82") {
            if (9..=10).contains(&rest.len()) && !rest.starts_with('0') {
                digits = format!("0{rest}");
            }
        }

        let layout = match (digits.len(), digits.starts_with("02")) {
            (9, true) => Some((2, 3)),
            (10, true) => Some((2, 4)),
            (10, false) if digits.starts_with('0') => Some((3, 3)),
            (11, false) if digits.starts_with('0') => Some((3, 4)),
            _ => None,
        };
        match layout {
            Some((a, b)) => format!("{}-{}-{}", &digits[..a], &digits[a..a + b], &digits[a + b..]),
            None => digits,
        }
    }
}

/// Trims text, collapses whitespace and canonicalises phone numbers.
#[derive(Debug, Default)]
pub struct NormalizeRows;

#[async_trait]
impl Step for NormalizeRows {
    fn key(&self) -> &str {
        "normalize_rows"
    }

    fn name(&self) -> &str {
        "Normalize order rows"
    }

    async fn execute(&self, _ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let normalizer = Normalizer::new()?;
        for record in &mut state.records {
            record.order_no = normalizer.text(&record.order_no);
            record.recipient = normalizer.text(&record.recipient);
            record.address = normalizer.text(&record.address);
            record.product = normalizer.text(&record.product);
            record.phone = normalizer.phone(&record.phone);
            record.memo = record.memo.as_deref().map(|m| normalizer.text(m));
        }
        Ok(StepOutcome::Continue)
    }
}

/// Folds rows with the same order number, product and recipient into one
/// record, summing quantities.
#[derive(Debug, Default)]
pub struct MergeDuplicates;

#[async_trait]
impl Step for MergeDuplicates {
    fn key(&self) -> &str {
        "merge_duplicates"
    }

    fn name(&self) -> &str {
        "Merge duplicate orders"
    }

    async fn execute(&self, _ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let before = state.records.len();
        let mut merged: Vec<OrderRecord> = Vec::with_capacity(before);
        let mut positions: HashMap<(String, String, String), usize> = HashMap::new();

        for record in std::mem::take(&mut state.records) {
            let key = (
                record.order_no.clone(),
                record.product.clone(),
                record.recipient.clone(),
            );
            if let Some(&pos) = positions.get(&key) {
                let target = &mut merged[pos];
                target.quantity = target.quantity.saturating_add(record.quantity);
                target.source_lines.extend(record.source_lines);
                if target.memo.is_none() {
                    target.memo = record.memo;
                }
            } else {
                positions.insert(key, merged.len());
                merged.push(record);
            }
        }

        let folded = before - merged.len();
        if folded > 0 {
            info!(folded, remaining = merged.len(), "Merged duplicate order rows");
        }
        state.records = merged;
        Ok(StepOutcome::Continue)
    }
}
