//! Scripted steps for driving the executor.

use crate::errors::{CollaboratorError, OrderflowError, Result, Service};
use crate::pipeline::{Criticality, JobState, Step, StepContext, StepOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared record of which scripted steps ran, in order.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
enum Script {
    Continue,
    NoData(String),
    Fail(String),
    Panic(String),
    Sleep(Duration),
}

/// A step whose behaviour is fixed up front.
#[derive(Debug)]
pub struct ScriptedStep {
    key: String,
    name: String,
    criticality: Criticality,
    script: Script,
    calls: AtomicUsize,
    journal: Option<Journal>,
}

impl ScriptedStep {
    fn scripted(key: impl Into<String>, script: Script) -> Self {
        let key = key.into();
        Self {
            name: format!("Step {key}"),
            key,
            criticality: Criticality::Critical,
            script,
            calls: AtomicUsize::new(0),
            journal: None,
        }
    }

    /// Succeeds.
    #[must_use]
    pub fn ok(key: impl Into<String>) -> Self {
        Self::scripted(key, Script::Continue)
    }

    /// Reports that there is nothing to process.
    #[must_use]
    pub fn no_data(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::scripted(key, Script::NoData(reason.into()))
    }

    /// Fails with a database error.
    #[must_use]
    pub fn failing(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::scripted(key, Script::Fail(message.into()))
    }

    /// Panics.
    #[must_use]
    pub fn panicking(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::scripted(key, Script::Panic(message.into()))
    }

    /// Sleeps, then succeeds.
    #[must_use]
    pub fn slow(key: impl Into<String>, delay: Duration) -> Self {
        Self::scripted(key, Script::Sleep(delay))
    }

    /// Marks the step non-critical.
    #[must_use]
    pub fn non_critical(mut self) -> Self {
        self.criticality = Criticality::NonCritical;
        self
    }

    /// Appends the step key to `journal` on every call.
    #[must_use]
    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    /// Number of times the step ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn key(&self) -> &str {
        &self.key
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn criticality(&self) -> Criticality {
        self.criticality
    }

    async fn execute(&self, _ctx: &StepContext, _state: &mut JobState) -> Result<StepOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.lock().push(self.key.clone());
        }

        match &self.script {
            Script::Continue => Ok(StepOutcome::Continue),
            Script::NoData(reason) => Ok(StepOutcome::no_data(reason.clone())),
            Script::Fail(message) => Err(OrderflowError::from(
                CollaboratorError::new(Service::Database, "execute", message.clone())
                    .with_source(std::io::Error::new(std::io::ErrorKind::TimedOut, "statement timed out")),
            )),
            Script::Panic(message) => panic!("{message}"),
            Script::Sleep(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(StepOutcome::Continue)
            }
        }
    }
}
