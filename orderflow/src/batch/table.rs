//! The batch interval table.

use crate::errors::ValidationError;
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

const MINUTES_PER_DAY: usize = 24 * 60;

/// A named time-of-day window.
///
/// `start` is inclusive and `end` exclusive. When `end <= start` the window
/// wraps midnight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Batch {
    /// Display label, e.g. "1차" or "막차".
    pub label: String,
    /// First instant of the window.
    pub start: NaiveTime,
    /// First instant after the window.
    pub end: NaiveTime,
    /// Position of the batch within a business day, starting at 1.
    pub ordinal: u32,
}

impl Batch {
    /// Creates a new batch window.
    #[must_use]
    pub fn new(label: impl Into<String>, start: NaiveTime, end: NaiveTime, ordinal: u32) -> Self {
        Self {
            label: label.into(),
            start,
            end,
            ordinal,
        }
    }

    /// Returns true if the window crosses midnight.
    #[must_use]
    pub fn wraps_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// Returns true if `time` falls inside the window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.start || time < self.end
        } else {
            time >= self.start && time < self.end
        }
    }

    /// Renders the window as `HH:MM-HH:MM`.
    #[must_use]
    pub fn window(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }

    fn minute_range(&self) -> impl Iterator<Item = usize> {
        let start = minute_of_day(self.start);
        let end = minute_of_day(self.end);
        let len = if end <= start {
            MINUTES_PER_DAY - start + end
        } else {
            end - start
        };
        (0..len).map(move |offset| (start + offset) % MINUTES_PER_DAY)
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.window())
    }
}

fn minute_of_day(time: NaiveTime) -> usize {
    (time.hour() * 60 + time.minute()) as usize
}

pub(crate) fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn standard_batches() -> Vec<Batch> {
    vec![
        Batch::new("1차", hm(23, 0), hm(7, 0), 1),
        Batch::new("2차", hm(7, 0), hm(10, 0), 2),
        Batch::new("3차", hm(10, 0), hm(11, 0), 3),
        Batch::new("4차", hm(11, 0), hm(13, 0), 4),
        Batch::new("5차", hm(13, 0), hm(15, 0), 5),
        Batch::new("막차", hm(15, 0), hm(18, 0), 6),
        Batch::new("추가", hm(18, 0), hm(23, 0), 7),
    ]
}

/// A validated, totally ordered set of batch windows covering the whole day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTable {
    batches: Vec<Batch>,
}

impl Default for BatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl BatchTable {
    /// Builds a table, checking that the windows cover 24h exactly once.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty tables, duplicate labels or
    /// ordinals, windows not aligned to whole minutes, gaps and overlaps.
    pub fn new(mut batches: Vec<Batch>) -> Result<Self, ValidationError> {
        if batches.is_empty() {
            return Err(ValidationError::new("batch table is empty"));
        }

        let mut problems = Vec::new();
        let mut labels = HashSet::new();
        let mut ordinals = HashSet::new();
        for batch in &batches {
            if batch.label.trim().is_empty() {
                problems.push(format!("batch #{} has an empty label", batch.ordinal));
            }
            if !labels.insert(batch.label.trim().to_string()) {
                problems.push(format!("duplicate label '{}'", batch.label));
            }
            if !ordinals.insert(batch.ordinal) {
                problems.push(format!("duplicate ordinal {}", batch.ordinal));
            }
            for time in [batch.start, batch.end] {
                if time.second() != 0 || time.nanosecond() != 0 {
                    problems.push(format!("'{}' boundary {time} is not on a whole minute", batch.label));
                }
            }
        }

        let mut owner: Vec<Option<usize>> = vec![None; MINUTES_PER_DAY];
        for (idx, batch) in batches.iter().enumerate() {
            for minute in batch.minute_range() {
                if let Some(other) = owner[minute] {
                    problems.push(format!(
                        "'{}' overlaps '{}' at {:02}:{:02}",
                        batch.label,
                        batches[other].label,
                        minute / 60,
                        minute % 60
                    ));
                    break;
                }
                owner[minute] = Some(idx);
            }
        }
        if let Some(gap) = owner.iter().position(Option::is_none) {
            problems.push(format!("no batch covers {:02}:{:02}", gap / 60, gap % 60));
        }

        if !problems.is_empty() {
            return Err(ValidationError::new("invalid batch table").with_details(problems));
        }

        batches.sort_by_key(|b| b.ordinal);
        Ok(Self { batches })
    }

    /// The built-in table used in production.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            batches: standard_batches(),
        }
    }

    /// Batches in ordinal order.
    #[must_use]
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Looks up a batch by label, ignoring surrounding whitespace.
    #[must_use]
    pub fn find(&self, label: &str) -> Option<&Batch> {
        let label = label.trim();
        self.batches.iter().find(|b| b.label == label)
    }

    /// Returns the batch whose window contains `time`.
    #[must_use]
    pub fn classify(&self, time: NaiveTime) -> &Batch {
        // Construction guarantees exactly one match.
        self.batches
            .iter()
            .find(|b| b.contains(time))
            .unwrap_or(&self.batches[0])
    }
}
