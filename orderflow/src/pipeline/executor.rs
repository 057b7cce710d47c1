//! Drives resolved steps through the error boundary and aggregates one outcome.

use super::{
    BatchConfirm, FailureRecord, JobState, LogLevel, LogSink, ProgressSink, ProgressUpdate, RunOutcome,
    RunReport, RunRequest, StepCatalog, StepContext, StepOutcome,
};
use crate::batch::{BatchClassifier, BatchSlot};
use crate::cancellation::CancellationToken;
use crate::collaborators::Collaborators;
use crate::config::PipelineConfig;
use crate::errors::{OrderflowError, Result, ValidationError};
use crate::pipeline::Criticality;
use crate::registry::{ResolvedStep, StepPlan, StepRegistry};
use crate::tracker::RunTracker;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Executes the main pipeline and the sales sub-pipeline.
///
/// Both entry points share the same driver: the tracker lifecycle, the
/// per-step error boundary and outcome aggregation.
#[derive(Debug)]
pub struct PipelineExecutor {
    collaborators: Collaborators,
    registry: StepRegistry,
    tracker: Arc<RunTracker>,
    classifier: BatchClassifier,
    config: PipelineConfig,
    main_catalog: StepCatalog,
    sales_catalog: StepCatalog,
}

/// Per-run inputs handed to the driver.
struct RunPlan {
    plan: StepPlan,
    slot: BatchSlot,
    spreadsheet_path: Option<PathBuf>,
    cancel: Option<CancellationToken>,
    warnings: Vec<String>,
}

/// Forwards log lines to the caller's sink and mirrors them to `tracing`.
struct RunLog<'a> {
    sink: &'a dyn LogSink,
}

impl RunLog<'_> {
    fn info(&self, message: &str) {
        info!(target: "orderflow::run", "{message}");
        self.sink.log(LogLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        warn!(target: "orderflow::run", "{message}");
        self.sink.log(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        error!(target: "orderflow::run", "{message}");
        self.sink.log(LogLevel::Error, message);
    }
}

impl PipelineExecutor {
    /// Creates an executor with the standard batch table, default
    /// configuration and built-in catalogs.
    #[must_use]
    pub fn new(collaborators: Collaborators, registry: StepRegistry, tracker: Arc<RunTracker>) -> Self {
        Self {
            collaborators,
            registry,
            tracker,
            classifier: BatchClassifier::default(),
            config: PipelineConfig::default(),
            main_catalog: StepCatalog::main(),
            sales_catalog: StepCatalog::sales(),
        }
    }

    /// Sets the batch classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: BatchClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the main pipeline catalog.
    #[must_use]
    pub fn with_main_catalog(mut self, catalog: StepCatalog) -> Self {
        self.main_catalog = catalog;
        self
    }

    /// Replaces the sales sub-pipeline catalog.
    #[must_use]
    pub fn with_sales_catalog(mut self, catalog: StepCatalog) -> Self {
        self.sales_catalog = catalog;
        self
    }

    /// The shared run tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<RunTracker> {
        &self.tracker
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the main pipeline on a spreadsheet.
    ///
    /// Never returns an error: every failure is folded into the report.
    pub async fn run(&self, request: RunRequest, log: &dyn LogSink, progress: &dyn ProgressSink) -> RunReport {
        let log = RunLog { sink: log };

        if let Err(err) = Self::check_preconditions(&request).await {
            log.error(&format!("Run rejected: {err}"));
            let failure = FailureRecord::from_error("preconditions", "Check run parameters", &err);
            return RunReport::not_started(RunOutcome::Failed(failure), Vec::new());
        }

        let validation = self.classifier.validate(&request.batch_label);
        if validation.needs_confirmation() {
            log.warning(&validation.explanation);
            if !request.confirm.allows(&validation) {
                let reason = format!("batch '{}' was not confirmed", validation.claimed);
                log.info(&format!("Run cancelled: {reason}"));
                return RunReport::not_started(RunOutcome::Aborted(reason), vec![validation.explanation]);
            }
            if matches!(request.confirm, BatchConfirm::Ask(_)) {
                log.info(&format!("Batch '{}' confirmed by operator", validation.claimed));
            }
        }

        let slot = self
            .classifier
            .slot_for_label(&validation.claimed)
            .unwrap_or_else(|| self.classifier.current_slot());

        let mut warnings = Vec::new();
        if !validation.matches {
            warnings.push(validation.explanation.clone());
        }

        let plan = self
            .registry
            .resolve(&self.config.step_group, &self.main_catalog)
            .await
            .truncated(request.test_level);

        let span = info_span!(
            "pipeline_run",
            pipeline = "main",
            batch = %slot.batch_key(),
            test_level = request.test_level,
        );
        self.drive(
            RunPlan {
                plan,
                slot,
                spreadsheet_path: Some(request.spreadsheet_path),
                cancel: request.cancel,
                warnings,
            },
            &log,
            progress,
        )
        .instrument(span)
        .await
    }

    /// Runs only the sales input steps for the current batch.
    ///
    /// Every resolved sales step runs; the test-level cap does not apply.
    pub async fn process_sales_input_data(&self, log: &dyn LogSink, progress: &dyn ProgressSink) -> RunReport {
        let log = RunLog { sink: log };
        let slot = self.classifier.current_slot();
        let plan = self
            .registry
            .resolve(&self.config.sales_step_group, &self.sales_catalog)
            .await;

        let span = info_span!("pipeline_run", pipeline = "sales", batch = %slot.batch_key());
        self.drive(
            RunPlan {
                plan,
                slot,
                spreadsheet_path: None,
                cancel: None,
                warnings: Vec::new(),
            },
            &log,
            progress,
        )
        .instrument(span)
        .await
    }

    async fn check_preconditions(request: &RunRequest) -> Result<()> {
        if request.test_level < 1 {
            return Err(ValidationError::new(format!(
                "test level must be at least 1, got {}",
                request.test_level
            ))
            .into());
        }

        let path = &request.spreadsheet_path;
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            ValidationError::new(format!("spreadsheet '{}' is not accessible: {e}", path.display()))
        })?;
        if !metadata.is_file() {
            return Err(ValidationError::new(format!("'{}' is not a file", path.display())).into());
        }
        tokio::fs::File::open(path).await.map_err(|e| {
            ValidationError::new(format!("spreadsheet '{}' is not readable: {e}", path.display()))
        })?;
        Ok(())
    }

    async fn drive(&self, run: RunPlan, log: &RunLog<'_>, progress: &dyn ProgressSink) -> RunReport {
        let RunPlan {
            plan,
            slot,
            spreadsheet_path,
            cancel,
            mut warnings,
        } = run;

        for warning in &plan.warnings {
            log.warning(warning);
        }
        warnings.extend(plan.warnings.iter().cloned());

        let target_steps = plan.len();
        let run_id = match self.tracker.start_with_tick_interval(target_steps, self.config.tick_interval()) {
            Ok(run_id) => run_id,
            Err(err) => {
                let err = OrderflowError::from(err);
                log.error(&format!("Run could not start: {err}"));
                let failure = FailureRecord::from_error("start", "Start run", &err);
                return RunReport::not_started(RunOutcome::Failed(failure), warnings);
            }
        };

        log.info(&format!(
            "Run {run_id} started for batch {} ({} steps)",
            slot.batch_key(),
            target_steps
        ));

        let ctx = StepContext {
            run_id,
            spreadsheet_path,
            slot,
            config: self.config.clone(),
            collaborators: self.collaborators.clone(),
        };
        let mut state = JobState::default();
        let mut contained_failures = Vec::new();
        let mut steps_executed = 0usize;

        let mut outcome = RunOutcome::Success;
        for resolved in &plan.steps {
            if let Some(token) = cancel.as_ref().filter(|t| t.is_cancelled()) {
                let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
                log.warning(&format!("Run cancelled before '{}': {reason}", resolved.descriptor.name));
                outcome = RunOutcome::Aborted(reason);
                break;
            }

            let descriptor = &resolved.descriptor;
            log.info(&format!(
                "[{}/{}] {} started",
                descriptor.index, target_steps, descriptor.name
            ));

            let result = self.execute_step(resolved, &ctx, &mut state).await;
            for warning in state.take_warnings() {
                log.warning(&format!("{}: {warning}", descriptor.name));
                warnings.push(warning);
            }

            match result {
                Ok(StepOutcome::Continue) => {
                    log.info(&format!("[{}/{}] {} completed", descriptor.index, target_steps, descriptor.name));
                }
                Ok(StepOutcome::NoData(reason)) => {
                    log.info(&format!("{}: nothing to process ({reason})", descriptor.name));
                    outcome = RunOutcome::NoData(reason);
                    break;
                }
                Err(err) if resolved.criticality() == Criticality::NonCritical => {
                    let failure = FailureRecord::from_error(&descriptor.key, &descriptor.name, &err);
                    let message = format!("{} failed and was skipped: {err}", descriptor.name);
                    log.warning(&message);
                    warnings.push(message);
                    contained_failures.push(failure);
                }
                Err(err) => {
                    let failure = FailureRecord::from_error(&descriptor.key, &descriptor.name, &err);
                    log.error(&format!("{} failed: {}", descriptor.name, failure.full_message()));
                    outcome = RunOutcome::Failed(failure);
                    break;
                }
            }

            steps_executed += 1;
            self.report_progress(resolved, steps_executed, target_steps, progress);
        }

        let elapsed = match self.tracker.complete() {
            Ok(snapshot) => snapshot.elapsed,
            Err(err) => {
                log.warning(&format!("Run tracker was not running at completion: {err}"));
                self.tracker.elapsed()
            }
        };

        match &outcome {
            RunOutcome::Success => log.info(&format!("Run {run_id} completed in {:.1}s", elapsed.as_secs_f64())),
            other => log.info(&format!("Run {run_id} finished: {}", other.user_message())),
        }

        RunReport {
            run_id: Some(run_id),
            outcome,
            steps_executed,
            target_steps,
            warnings,
            contained_failures,
            uploads: state.upload.into_iter().collect(),
            elapsed,
        }
    }

    fn report_progress(&self, resolved: &ResolvedStep, current: usize, target: usize, progress: &dyn ProgressSink) {
        let descriptor = &resolved.descriptor;
        let fraction = match self.tracker.advance_step(descriptor.index, &descriptor.name) {
            Ok(fraction) => fraction,
            Err(err) => {
                warn!(error = %err, step = %descriptor.key, "Tracker rejected step update");
                fallback_fraction(current, target)
            }
        };
        progress.report(&ProgressUpdate {
            step_index: descriptor.index,
            step_name: descriptor.name.clone(),
            current_step: current,
            target_steps: target,
            fraction,
        });
    }

    /// Runs one step with the configured timeout, converting panics into
    /// internal errors.
    async fn execute_step(&self, resolved: &ResolvedStep, ctx: &StepContext, state: &mut JobState) -> Result<StepOutcome> {
        let key = resolved.descriptor.key.as_str();
        let guarded = AssertUnwindSafe(resolved.step.execute(ctx, state)).catch_unwind();

        let caught = match self.config.step_timeout() {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| OrderflowError::Timeout {
                    step: key.to_string(),
                    seconds: limit.as_secs(),
                })?,
            None => guarded.await,
        };

        caught.unwrap_or_else(|payload| {
            Err(OrderflowError::internal(format!(
                "step '{key}' panicked: {}",
                panic_message(payload.as_ref())
            )))
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn fallback_fraction(current: usize, target: usize) -> f64 {
    if target == 0 {
        1.0
    } else {
        (current as f64 / target as f64).min(1.0)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
