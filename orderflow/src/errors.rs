//! Error types for the orderflow pipeline.
//!
//! Every failure a step can produce is an [`OrderflowError`]. The executor
//! classifies errors into an [`ErrorCategory`] at the step boundary so that the
//! caller only ever sees a coarse outcome plus a readable message.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Boxed error used as the inner cause of collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for orderflow operations.
#[derive(Debug, Error)]
pub enum OrderflowError {
    /// Input failed validation (bad file, bad rows, bad parameters).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The spreadsheet could not be interpreted.
    #[error(transparent)]
    FileFormat(#[from] FileFormatError),

    /// A database, storage or notification call failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// A component was driven through an illegal state transition.
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run was cancelled.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// A step exceeded its time budget.
    #[error("Step '{step}' timed out after {seconds}s")]
    Timeout {
        /// The step that timed out.
        step: String,
        /// The configured budget in seconds.
        seconds: u64,
    },

    /// A generic internal error (including panics caught at a step boundary).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrderflowError {
    /// Returns the coarse category used for outcome aggregation.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::FileFormat(_) => ErrorCategory::Validation,
            Self::Collaborator(_) | Self::Io(_) => ErrorCategory::Collaborator,
            Self::InvalidState(_) => ErrorCategory::InvariantViolation,
            Self::Cancelled(_) => ErrorCategory::Cancelled,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Config(_) => ErrorCategory::Config,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns the message of every error in the source chain, outermost first.
    #[must_use]
    pub fn cause_chain(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            causes.push(err.to_string());
            current = err.source();
        }
        causes
    }

    /// Shorthand for a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Shorthand for an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input; abort before writes.
    Validation,
    /// An external service failed.
    Collaborator,
    /// Programmer error, e.g. tracker double start.
    InvariantViolation,
    /// Cooperative cancellation.
    Cancelled,
    /// Step time budget exceeded.
    Timeout,
    /// Configuration problem.
    Config,
    /// Anything else.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Collaborator => write!(f, "collaborator"),
            Self::InvariantViolation => write!(f, "invariant_violation"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "timeout"),
            Self::Config => write!(f, "config"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Error raised when input data or run parameters are invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// Individual problems, e.g. one entry per bad spreadsheet line.
    pub details: Vec<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Sets the detail lines.
    #[must_use]
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// Error raised when spreadsheet headers are missing or malformed.
#[derive(Debug, Clone, Error)]
#[error("Invalid spreadsheet '{path}': {reason}")]
pub struct FileFormatError {
    /// The file that failed to parse.
    pub path: String,
    /// What was wrong with it.
    pub reason: String,
}

impl FileFormatError {
    /// Creates a new file format error.
    #[must_use]
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The external service a collaborator error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// Spreadsheet reading/writing.
    Spreadsheet,
    /// The relational database.
    Database,
    /// Cloud file storage.
    Storage,
    /// Chat notifications.
    Notification,
    /// The `CommonCode` configuration store.
    ConfigStore,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spreadsheet => write!(f, "spreadsheet"),
            Self::Database => write!(f, "database"),
            Self::Storage => write!(f, "storage"),
            Self::Notification => write!(f, "notification"),
            Self::ConfigStore => write!(f, "config_store"),
        }
    }
}

/// Error raised when a collaborator call fails.
#[derive(Debug, Error)]
#[error("{service} {operation} failed: {message}")]
pub struct CollaboratorError {
    /// The service that failed.
    pub service: Service,
    /// The operation that was attempted (e.g. "execute", "upload").
    pub operation: String,
    /// The error message.
    pub message: String,
    /// The underlying cause, if the collaborator supplied one.
    #[source]
    pub source: Option<BoxError>,
}

impl CollaboratorError {
    /// Creates a new collaborator error.
    #[must_use]
    pub fn new(service: Service, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service,
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Error raised when a state machine is driven through an illegal transition.
#[derive(Debug, Clone, Error)]
#[error("Invalid state for '{operation}': expected {expected}, found {actual}")]
pub struct InvalidStateError {
    /// The attempted operation.
    pub operation: String,
    /// The state(s) the operation requires.
    pub expected: String,
    /// The state the component was in.
    pub actual: String,
}

impl InvalidStateError {
    /// Creates a new invalid state error.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result alias used by steps and collaborators.
pub type Result<T, E = OrderflowError> = std::result::Result<T, E>;
