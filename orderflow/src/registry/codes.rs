//! `CommonCode` rows and the store that serves them.

use crate::errors::OrderflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// `Attribute1` value marking a step whose failure only produces a warning.
pub const OPTIONAL_MARKER: &str = "OPTIONAL";

/// One row of the `CommonCode` configuration table, keyed by
/// `(group_code, code)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonCode {
    /// Group the code belongs to, e.g. `PG_PROC`.
    pub group_code: String,
    /// Code within the group.
    pub code: String,
    /// Display name.
    pub code_name: String,
    /// Ordering key within the group.
    #[serde(default)]
    pub sort_order: i32,
    /// Whether the row is active.
    #[serde(default = "default_is_used")]
    pub is_used: bool,
    /// Free-form attribute.
    #[serde(default)]
    pub attribute1: Option<String>,
    /// Free-form attribute.
    #[serde(default)]
    pub attribute2: Option<String>,
}

fn default_is_used() -> bool {
    true
}

impl CommonCode {
    /// Creates an active code with no attributes.
    #[must_use]
    pub fn new(
        group_code: impl Into<String>,
        code: impl Into<String>,
        code_name: impl Into<String>,
        sort_order: i32,
    ) -> Self {
        Self {
            group_code: group_code.into(),
            code: code.into(),
            code_name: code_name.into(),
            sort_order,
            is_used: true,
            attribute1: None,
            attribute2: None,
        }
    }

    /// Marks the row inactive.
    #[must_use]
    pub fn unused(mut self) -> Self {
        self.is_used = false;
        self
    }

    /// Sets `Attribute1`.
    #[must_use]
    pub fn with_attribute1(mut self, value: impl Into<String>) -> Self {
        self.attribute1 = Some(value.into());
        self
    }

    /// Sets `Attribute2`.
    #[must_use]
    pub fn with_attribute2(mut self, value: impl Into<String>) -> Self {
        self.attribute2 = Some(value.into());
        self
    }

    /// Marks the row optional (`Attribute1 = OPTIONAL`).
    #[must_use]
    pub fn optional(self) -> Self {
        self.with_attribute1(OPTIONAL_MARKER)
    }

    /// Returns true when `Attribute1` carries the optional marker.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.attribute1
            .as_deref()
            .is_some_and(|a| a.trim().eq_ignore_ascii_case(OPTIONAL_MARKER))
    }
}

/// Source of `CommonCode` rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns every row of `group`, used or not, in storage order.
    async fn codes(&self, group: &str) -> Result<Vec<CommonCode>, OrderflowError>;
}
