//! Relational store contract.

use crate::errors::OrderflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One result row, keyed by column name.
pub type DbRow = BTreeMap<String, Value>;

/// A parameterised SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// SQL text with positional placeholders.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

impl Statement {
    /// Creates a statement without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sql = self.sql.split_whitespace().collect::<Vec<_>>().join(" ");
        write!(f, "{sql} [{} params]", self.params.len())
    }
}

/// The relational database.
///
/// No transaction boundary is exposed; each call stands alone.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Executes a statement and returns the number of affected rows.
    async fn execute(&self, statement: &Statement) -> Result<u64, OrderflowError>;

    /// Runs a query and returns its rows.
    async fn query(&self, statement: &Statement) -> Result<Vec<DbRow>, OrderflowError>;
}
