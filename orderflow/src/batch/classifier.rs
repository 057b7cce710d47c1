//! Mapping wall-clock time to batches and checking declared batches.

use super::{Batch, BatchTable, Clock, SystemClock};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A batch pinned to the business day it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSlot {
    /// The batch window.
    pub batch: Batch,
    /// The business day. For the part of a wrapping window before midnight
    /// this is the following calendar day.
    pub business_date: NaiveDate,
}

impl BatchSlot {
    /// Natural key used to register the batch, e.g. `20240302-1차`.
    #[must_use]
    pub fn batch_key(&self) -> String {
        format!("{}-{}", self.business_date.format("%Y%m%d"), self.batch.label)
    }
}

/// Result of comparing a declared batch label with the current batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchValidation {
    /// The label the operator declared.
    pub claimed: String,
    /// The batch the clock says is current.
    pub current: Batch,
    /// Whether the declared label is the current batch.
    pub matches: bool,
    /// Whether the declared label exists in the table at all.
    pub known: bool,
    /// Human-readable explanation, suitable for a continue/cancel prompt.
    pub explanation: String,
}

impl BatchValidation {
    /// Returns true if the caller should be asked before continuing.
    #[must_use]
    pub fn needs_confirmation(&self) -> bool {
        !self.matches
    }
}

/// Classifies instants into batches using a fixed table and a clock.
#[derive(Debug, Clone)]
pub struct BatchClassifier {
    table: BatchTable,
    clock: Arc<dyn Clock>,
}

impl Default for BatchClassifier {
    fn default() -> Self {
        Self::new(BatchTable::standard(), Arc::new(SystemClock))
    }
}

impl BatchClassifier {
    /// Creates a classifier over `table` reading time from `clock`.
    #[must_use]
    pub fn new(table: BatchTable, clock: Arc<dyn Clock>) -> Self {
        Self { table, clock }
    }

    /// Standard table with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::new(BatchTable::standard(), clock)
    }

    /// The underlying table.
    #[must_use]
    pub fn table(&self) -> &BatchTable {
        &self.table
    }

    /// The current local time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// The batch for a time of day.
    #[must_use]
    pub fn classify(&self, time: NaiveTime) -> &Batch {
        self.table.classify(time)
    }

    /// The batch for the current instant.
    #[must_use]
    pub fn classify_now(&self) -> Batch {
        self.classify(self.clock.now().time()).clone()
    }

    /// The batch and business day for an instant.
    #[must_use]
    pub fn slot_at(&self, at: NaiveDateTime) -> BatchSlot {
        let batch = self.classify(at.time()).clone();
        let business_date = if batch.wraps_midnight() && at.time() >= batch.start {
            at.date().succ_opt().unwrap_or(at.date())
        } else {
            at.date()
        };
        BatchSlot {
            batch,
            business_date,
        }
    }

    /// The batch and business day for the current instant.
    #[must_use]
    pub fn current_slot(&self) -> BatchSlot {
        self.slot_at(self.clock.now())
    }

    /// Places a declared label on the business day of its most recent
    /// opening: the current occurrence if the window has already opened,
    /// otherwise the one before it.
    ///
    /// Returns `None` for labels that are not in the table.
    #[must_use]
    pub fn slot_for_label(&self, label: &str) -> Option<BatchSlot> {
        let batch = self.table.find(label)?.clone();
        let now = self.clock.now();
        let today = self.slot_at(now).business_date;

        // A wrapping window opens the evening before its business day.
        let opens_at = |day: NaiveDate| {
            let open_day = if batch.wraps_midnight() {
                day.pred_opt().unwrap_or(day)
            } else {
                day
            };
            open_day.and_time(batch.start)
        };
        let business_date = if opens_at(today) <= now {
            today
        } else {
            today.pred_opt().unwrap_or(today)
        };

        Some(BatchSlot {
            batch,
            business_date,
        })
    }

    /// Compares a declared label with the current batch.
    ///
    /// A mismatch is reported as data, never as an error: the caller decides
    /// whether to prompt an operator or continue.
    #[must_use]
    pub fn validate(&self, claimed: &str) -> BatchValidation {
        let current = self.classify_now();
        let claimed = claimed.trim().to_string();

        let Some(declared) = self.table.find(&claimed) else {
            let explanation = format!(
                "batch '{claimed}' is not in the batch table and cannot be validated; \
                 the current batch is '{}' ({})",
                current.label,
                current.window()
            );
            return BatchValidation {
                claimed,
                current,
                matches: false,
                known: false,
                explanation,
            };
        };

        if declared.label == current.label {
            let explanation = format!("batch '{claimed}' matches the current window {}", current.window());
            return BatchValidation {
                claimed,
                current,
                matches: true,
                known: true,
                explanation,
            };
        }

        let explanation = format!(
            "declared batch '{claimed}' ({}) does not match the current batch '{}' ({}); \
             continue only for a deliberate override or backfill",
            declared.window(),
            current.label,
            current.window()
        );
        BatchValidation {
            claimed,
            current,
            matches: false,
            known: true,
            explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::table::hm;
    use crate::batch::FixedClock;
    use chrono::{NaiveDate, Timelike};
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(hm(hour, minute))
    }

    fn classifier_at(now: NaiveDateTime) -> BatchClassifier {
        BatchClassifier::with_clock(Arc::new(FixedClock::new(now)))
    }

    #[test]
    fn test_classify_now_is_idempotent() {
        let classifier = classifier_at(at(2024, 3, 1, 8, 15));
        let first = classifier.classify_now();
        let second = classifier.classify_now();

        assert_eq!(first, second);
        assert_eq!(first.label, "2차");
    }

    #[test]
    fn test_validate_symmetry_for_every_batch() {
        for batch in BatchTable::standard().batches() {
            let classifier = classifier_at(at(2024, 3, 1, batch.start.hour(), 0));
            let current = classifier.classify_now();
            let validation = classifier.validate(&current.label);

            assert!(validation.matches, "{} should validate", current.label);
            assert!(validation.known);
            assert!(!validation.needs_confirmation());
        }
    }

    #[test]
    fn test_validate_mismatch_explains() {
        let classifier = classifier_at(at(2024, 3, 1, 8, 0));
        let validation = classifier.validate("4차");

        assert!(!validation.matches);
        assert!(validation.known);
        assert_eq!(validation.current.label, "2차");
        assert!(validation.explanation.contains("4차"));
        assert!(validation.explanation.contains("2차"));
    }

    #[test]
    fn test_validate_unknown_label() {
        let classifier = classifier_at(at(2024, 3, 1, 12, 0));
        let validation = classifier.validate("9차");

        assert!(!validation.matches);
        assert!(!validation.known);
        assert!(validation.explanation.contains("cannot be validated"));
    }

    #[test]
    fn test_midnight_wrap_belongs_to_next_day() {
        let classifier = classifier_at(at(2024, 2, 29, 23, 30));

        let before_midnight = classifier.slot_at(at(2024, 2, 29, 23, 30));
        let after_midnight = classifier.slot_at(at(2024, 3, 1, 0, 30));
        let early_morning = classifier.slot_at(at(2024, 3, 1, 6, 59));

        assert_eq!(before_midnight.batch.label, "1차");
        assert_eq!(before_midnight.business_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(before_midnight, after_midnight);
        assert_eq!(after_midnight, early_morning);
        assert_eq!(before_midnight.batch_key(), "20240301-1차");
    }

    #[test]
    fn test_evening_batch_stays_on_same_day() {
        let classifier = classifier_at(at(2024, 3, 1, 22, 0));
        let slot = classifier.current_slot();

        assert_eq!(slot.batch.label, "추가");
        assert_eq!(slot.batch_key(), "20240301-추가");
    }

    #[test]
    fn test_slot_for_label_picks_most_recent_opening() {
        let classifier = classifier_at(at(2024, 3, 1, 23, 10));

        let closed = classifier.slot_for_label("막차").unwrap();
        let current = classifier.slot_for_label("1차").unwrap();

        assert_eq!(closed.batch_key(), "20240301-막차");
        assert_eq!(current.batch_key(), "20240302-1차");
        assert_eq!(current, classifier.current_slot());
        assert!(classifier.slot_for_label("없음").is_none());
    }

    #[test]
    fn test_slot_for_label_never_points_to_future_window() {
        let classifier = classifier_at(at(2024, 3, 1, 8, 30));

        assert_eq!(classifier.slot_for_label("2차").unwrap().batch_key(), "20240301-2차");
        assert_eq!(classifier.slot_for_label("4차").unwrap().batch_key(), "20240229-4차");

        let morning = classifier_at(at(2024, 3, 1, 6, 0));
        assert_eq!(morning.slot_for_label("추가").unwrap().batch_key(), "20240229-추가");
        assert_eq!(morning.slot_for_label("1차").unwrap().batch_key(), "20240301-1차");
    }
}
