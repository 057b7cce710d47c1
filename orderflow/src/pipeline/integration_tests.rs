//! End-to-end tests of the executor against in-memory collaborators.

#[cfg(test)]
mod tests {
    use crate::batch::BatchValidation;
    use crate::cancellation::CancellationToken;
    use crate::collaborators::{DbRow, SheetRow};
    use crate::config::{PipelineConfig, MAIN_STEP_GROUP, SALES_STEP_GROUP};
    use crate::errors::ErrorCategory;
    use crate::pipeline::{
        BatchConfirm, OutcomeKind, PipelineExecutor, ProgressUpdate, RunOutcome, RunReport, RunRequest,
        StepCatalog,
    };
    use crate::registry::{CommonCode, ConfigStore, StepRegistry};
    use crate::testing::{
        fixture_classifier, order_row, FakeDatabase, FakeNotifier, FakeServices, FakeSpreadsheet, FakeStorage,
        InMemoryConfigStore, Journal, RecordingLogSink, RecordingProgressSink, ScriptedStep,
    };
    use crate::tracker::{CollectingRunEventSink, RunTracker, TrackerState};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn codes_for(catalog: &StepCatalog, group: &str) -> Vec<CommonCode> {
        catalog
            .default_descriptors()
            .into_iter()
            .map(|d| {
                let code = CommonCode::new(group, d.key, d.name, d.sort_order);
                if d.non_critical {
                    code.optional()
                } else {
                    code
                }
            })
            .collect()
    }

    fn default_store() -> Arc<dyn ConfigStore> {
        let mut codes = codes_for(&StepCatalog::main(), MAIN_STEP_GROUP);
        codes.extend(codes_for(&StepCatalog::sales(), SALES_STEP_GROUP));
        Arc::new(InMemoryConfigStore::new(codes))
    }

    struct Harness {
        services: FakeServices,
        tracker: Arc<RunTracker>,
        events: Arc<CollectingRunEventSink>,
        log: RecordingLogSink,
        progress: RecordingProgressSink,
        config: PipelineConfig,
        store: Arc<dyn ConfigStore>,
        main_catalog: StepCatalog,
        input: tempfile::NamedTempFile,
        _work: tempfile::TempDir,
    }

    impl Harness {
        fn new(services: FakeServices) -> Self {
            let tracker = Arc::new(RunTracker::new());
            let events = Arc::new(CollectingRunEventSink::new());
            tracker.subscribe(events.clone());
            let work = tempfile::tempdir().unwrap();

            Self {
                services,
                tracker,
                events,
                log: RecordingLogSink::new(),
                progress: RecordingProgressSink::new(),
                config: PipelineConfig::default().with_work_dir(work.path()),
                store: default_store(),
                main_catalog: StepCatalog::main(),
                input: tempfile::NamedTempFile::new().unwrap(),
                _work: work,
            }
        }

        fn with_rows(rows: Vec<SheetRow>) -> Self {
            Self::new(FakeServices::new().with_reader(FakeSpreadsheet::with_rows(rows)))
        }

        /// Runs `catalog` instead of the built-in steps, in catalog order.
        fn with_catalog(mut self, catalog: StepCatalog) -> Self {
            self.store = Arc::new(InMemoryConfigStore::new(codes_for(&catalog, MAIN_STEP_GROUP)));
            self.main_catalog = catalog;
            self
        }

        fn with_store(mut self, store: InMemoryConfigStore) -> Self {
            self.store = Arc::new(store);
            self
        }

        fn with_config(mut self, config: PipelineConfig) -> Self {
            self.config = config;
            self
        }

        fn executor(&self) -> PipelineExecutor {
            PipelineExecutor::new(
                self.services.collaborators(),
                StepRegistry::new(self.store.clone()),
                self.tracker.clone(),
            )
            .with_classifier(fixture_classifier())
            .with_config(self.config.clone())
            .with_main_catalog(self.main_catalog.clone())
        }

        fn request(&self, test_level: usize) -> RunRequest {
            RunRequest::new(self.input.path(), test_level, "2차")
        }

        async fn run(&self, request: RunRequest) -> RunReport {
            self.executor().run(request, &self.log, &self.progress).await
        }

        fn completed_events(&self) -> usize {
            self.events.count_of_type("run.completed")
        }
    }

    fn sample_rows() -> Vec<SheetRow> {
        vec![
            order_row(2, "A-1", "사과", "1"),
            order_row(3, "A-1", "사과", "2"),
            order_row(4, "B-7", "배", "3"),
        ]
    }

    fn scripted_catalog(steps: &[Arc<ScriptedStep>]) -> StepCatalog {
        let mut catalog = StepCatalog::new();
        for step in steps {
            catalog.register(step.clone());
        }
        catalog
    }

    fn ten_steps_failing_at(position: usize) -> Vec<Arc<ScriptedStep>> {
        (1..=10)
            .map(|i| {
                let key = format!("step_{i:02}");
                Arc::new(if i == position {
                    ScriptedStep::failing(key, "insert into OrderLine failed")
                } else {
                    ScriptedStep::ok(key)
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_succeeds() {
        let h = Harness::with_rows(sample_rows());

        let report = h.run(h.request(14)).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.steps_executed, 14);
        assert_eq!(report.target_steps, 14);
        assert!(report.run_id.is_some());

        let fractions = h.progress.fractions();
        assert_eq!(fractions.len(), 14);
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
        assert!((fractions[13] - 1.0).abs() < f64::EPSILON);

        assert_eq!(h.services.database.statements_matching("INSERT INTO OrderLine").len(), 2);
        assert_eq!(h.services.database.statements_matching("SET Status = 'COMPLETED'").len(), 1);

        assert_eq!(report.uploads.len(), 1);
        assert_eq!(
            report.uploads[0].remote_path,
            "invoices/2024-03-01/invoice_20240301-2차.xlsx"
        );

        let sent = h.services.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].batch_label, "2차");
        assert_eq!(sent[0].record_count, 2);
        assert_eq!(sent[0].file_url, report.uploads[0].remote_url);

        let written = h.services.writer.writes();
        assert_eq!(written[0].rows[0][5], "3");

        assert_eq!(h.events.count_of_type("run.started"), 1);
        assert_eq!(h.events.count_of_type("run.step_updated"), 14);
        assert_eq!(h.completed_events(), 1);
        assert_eq!(h.tracker.state(), TrackerState::Completed);
        assert!(h.log.errors().is_empty());
        assert_eq!(report.outcome.kind(), OutcomeKind::Success);
    }

    #[tokio::test]
    async fn test_test_level_caps_executed_steps() {
        let h = Harness::with_rows(sample_rows());

        let report = h.run(h.request(3)).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.steps_executed, 3);
        assert_eq!(report.target_steps, 3);
        assert_eq!(
            h.progress.step_names(),
            vec!["Read order spreadsheet", "Validate order rows", "Normalize order rows"]
        );
        assert!((h.progress.fractions()[2] - 1.0).abs() < f64::EPSILON);
        assert!(h.services.database.statements().is_empty());
        assert!(report.uploads.is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_is_no_data() {
        let h = Harness::with_rows(Vec::new());

        let report = h.run(h.request(14)).await;

        assert!(matches!(report.outcome, RunOutcome::NoData(_)));
        assert_eq!(report.kind(), OutcomeKind::NothingDone);
        assert_eq!(report.steps_executed, 0);
        assert!(h.services.database.statements().is_empty());
        assert!(h.services.storage.uploads().is_empty());
        assert!(h.progress.updates().is_empty());
        assert_eq!(h.completed_events(), 1);
        assert!(report.outcome.user_message().contains("check the input"));
    }

    #[tokio::test]
    async fn test_mid_pipeline_failure_stops_remaining_steps() {
        let steps = ten_steps_failing_at(7);
        let h = Harness::new(FakeServices::new()).with_catalog(scripted_catalog(&steps));

        let report = h.run(h.request(10)).await;

        let failure = report.outcome.failure().cloned().unwrap();
        assert_eq!(failure.step_key, "step_07");
        assert_eq!(failure.category, ErrorCategory::Collaborator);
        assert_eq!(failure.causes, vec!["statement timed out".to_string()]);

        let calls: Vec<_> = steps.iter().map(|s| s.calls()).collect();
        assert_eq!(calls, vec![1, 1, 1, 1, 1, 1, 1, 0, 0, 0]);
        assert_eq!(report.steps_executed, 6);
        assert_eq!(h.progress.updates().len(), 6);
        assert_eq!(h.completed_events(), 1);
        assert!(h.log.errors().iter().any(|e| e.contains("statement timed out")));
        assert!(report.outcome.user_message().contains("check the logs"));
    }

    #[tokio::test]
    async fn test_no_data_step_ends_run_in_registry_order() {
        let journal = Journal::default();
        let steps = vec![
            Arc::new(ScriptedStep::ok("load").with_journal(&journal)),
            Arc::new(ScriptedStep::no_data("filter", "every order already shipped").with_journal(&journal)),
            Arc::new(ScriptedStep::ok("write").with_journal(&journal)),
        ];
        let store = InMemoryConfigStore::new(vec![
            CommonCode::new(MAIN_STEP_GROUP, "write", "Write", 30),
            CommonCode::new(MAIN_STEP_GROUP, "filter", "Filter", 20),
            CommonCode::new(MAIN_STEP_GROUP, "load", "Load", 10),
        ]);
        let h = Harness::new(FakeServices::new())
            .with_catalog(scripted_catalog(&steps))
            .with_store(store);

        let report = h.run(h.request(3)).await;

        assert_eq!(report.outcome, RunOutcome::NoData("every order already shipped".to_string()));
        assert_eq!(*journal.lock(), vec!["load".to_string(), "filter".to_string()]);
        assert_eq!(report.steps_executed, 1);
        assert_eq!(h.progress.step_names(), vec!["Load"]);
        assert_eq!(h.completed_events(), 1);
    }

    #[tokio::test]
    async fn test_non_critical_failure_is_contained() {
        let steps = vec![
            Arc::new(ScriptedStep::ok("first")),
            Arc::new(ScriptedStep::failing("optional", "seed rejected").non_critical()),
            Arc::new(ScriptedStep::ok("last")),
        ];
        let h = Harness::new(FakeServices::new()).with_catalog(scripted_catalog(&steps));

        let report = h.run(h.request(3)).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.steps_executed, 3);
        assert_eq!(report.contained_failures.len(), 1);
        assert_eq!(report.contained_failures[0].step_key, "optional");
        assert!(!h.log.warnings().is_empty());
        assert_eq!(steps[2].calls(), 1);
        assert!((h.progress.fractions()[2] - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_seed_failure_does_not_fail_run() {
        let services = FakeServices::new()
            .with_reader(FakeSpreadsheet::with_rows(sample_rows()))
            .with_database(FakeDatabase::new().with_batch_id(5).fail_on("INSERT INTO CommonCode"));
        let h = Harness::new(services);

        let report = h.run(h.request(14)).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.contained_failures[0].step_key, "seed_code_table");
        assert!(report.warnings.iter().any(|w| w.contains("skipped")));
        assert_eq!(h.services.notifier.sent()[0].batch_id, 5);
    }

    #[tokio::test]
    async fn test_batch_mismatch_override_continues() {
        let h = Harness::with_rows(sample_rows());
        let seen: Arc<Mutex<Option<BatchValidation>>> = Arc::new(Mutex::new(None));
        let seen_in_prompt = seen.clone();

        let request = RunRequest::new(h.input.path(), 14, "4차").with_confirm(BatchConfirm::ask(move |v| {
            *seen_in_prompt.lock() = Some(v.clone());
            true
        }));
        let report = h.run(request).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        let validation = seen.lock().clone().unwrap();
        assert_eq!(validation.current.label, "2차");
        assert!(report.warnings.iter().any(|w| w.contains("does not match")));
        assert_eq!(h.services.notifier.sent()[0].batch_label, "4차");
        assert_eq!(
            report.uploads[0].remote_path,
            "invoices/2024-02-29/invoice_20240229-4차.xlsx"
        );
    }

    #[tokio::test]
    async fn test_batch_mismatch_cancel_has_no_side_effects() {
        let h = Harness::with_rows(sample_rows());

        let request = RunRequest::new(h.input.path(), 14, "막차").with_confirm(BatchConfirm::Cancel);
        let report = h.run(request).await;

        assert!(matches!(report.outcome, RunOutcome::Aborted(_)));
        assert!(report.run_id.is_none());
        assert!(h.events.is_empty());
        assert_eq!(h.services.reader.reads(), 0);
        assert!(h.services.database.statements().is_empty());
        assert_eq!(h.tracker.state(), TrackerState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_batch_label_is_confirmed_not_rejected() {
        let h = Harness::with_rows(sample_rows());

        let request = RunRequest::new(h.input.path(), 1, "9차");
        let report = h.run(request).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert!(report.warnings.iter().any(|w| w.contains("cannot be validated")));
    }

    #[tokio::test]
    async fn test_preconditions_fail_before_tracker_start() {
        let h = Harness::with_rows(sample_rows());

        let zero = h.run(h.request(0)).await;
        let missing = h.run(RunRequest::new("/definitely/not/here.xlsx", 3, "2차")).await;
        let directory = h.run(RunRequest::new(std::env::temp_dir(), 3, "2차")).await;

        for report in [&zero, &missing, &directory] {
            assert_eq!(report.outcome.failure().map(|f| f.category), Some(ErrorCategory::Validation));
            assert!(report.run_id.is_none());
        }
        assert!(h.events.is_empty());
        assert_eq!(h.services.reader.reads(), 0);
    }

    #[tokio::test]
    async fn test_tracker_double_start_is_invariant_violation() {
        let h = Harness::with_rows(sample_rows());
        h.tracker.start(1).unwrap();

        let report = h.run(h.request(14)).await;

        assert_eq!(
            report.outcome.failure().map(|f| f.category),
            Some(ErrorCategory::InvariantViolation)
        );
        assert_eq!(h.services.reader.reads(), 0);
        assert_eq!(h.completed_events(), 0);
        assert!(h.tracker.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_first_step() {
        let h = Harness::with_rows(sample_rows());
        let token = CancellationToken::new();
        token.cancel("shutting down");

        let report = h.run(h.request(14).with_cancel(token)).await;

        assert_eq!(report.outcome, RunOutcome::Aborted("shutting down".to_string()));
        assert_eq!(report.steps_executed, 0);
        assert_eq!(h.services.reader.reads(), 0);
        assert_eq!(h.completed_events(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_between_steps() {
        let steps: Vec<_> = (1..=4).map(|i| Arc::new(ScriptedStep::ok(format!("s{i}")))).collect();
        let h = Harness::new(FakeServices::new()).with_catalog(scripted_catalog(&steps));
        let token = CancellationToken::new();
        let trip = token.clone();
        let progress = move |update: &ProgressUpdate| {
            if update.current_step == 2 {
                trip.cancel("operator pressed stop");
            }
        };

        let report = h
            .executor()
            .run(h.request(4).with_cancel(token), &h.log, &progress)
            .await;

        assert!(matches!(report.outcome, RunOutcome::Aborted(ref r) if r == "operator pressed stop"));
        assert_eq!(report.steps_executed, 2);
        let calls: Vec<_> = steps.iter().map(|s| s.calls()).collect();
        assert_eq!(calls, vec![1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn test_panicking_step_is_contained() {
        let steps = vec![
            Arc::new(ScriptedStep::ok("before")),
            Arc::new(ScriptedStep::panicking("explodes", "index out of range")),
            Arc::new(ScriptedStep::ok("after")),
        ];
        let h = Harness::new(FakeServices::new()).with_catalog(scripted_catalog(&steps));

        let report = h.run(h.request(3)).await;

        let failure = report.outcome.failure().cloned().unwrap();
        assert_eq!(failure.category, ErrorCategory::Internal);
        assert!(failure.error.contains("index out of range"));
        assert_eq!(steps[2].calls(), 0);
        assert_eq!(h.completed_events(), 1);

        let again = h.run(h.request(1)).await;
        assert_eq!(again.outcome, RunOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout() {
        let steps = vec![
            Arc::new(ScriptedStep::slow("hangs", Duration::from_secs(30))),
            Arc::new(ScriptedStep::ok("after")),
        ];
        let h = Harness::new(FakeServices::new())
            .with_catalog(scripted_catalog(&steps))
            .with_config(PipelineConfig::default().with_step_timeout_secs(2));

        let report = h.run(h.request(2)).await;

        let failure = report.outcome.failure().cloned().unwrap();
        assert_eq!(failure.category, ErrorCategory::Timeout);
        assert_eq!(failure.error, "Step 'hangs' timed out after 2s");
        assert_eq!(steps[1].calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_tick_interval_drives_heartbeats() {
        let slow = || vec![Arc::new(ScriptedStep::slow("long_query", Duration::from_millis(5500)))];

        let fast = Harness::new(FakeServices::new())
            .with_catalog(scripted_catalog(&slow()))
            .with_config(PipelineConfig::default().with_tick_interval_secs(1));
        let report = fast.run(fast.request(1)).await;
        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(fast.events.count_of_type("run.time_updated"), 5);

        let default = Harness::new(FakeServices::new()).with_catalog(scripted_catalog(&slow()));
        default.run(default.request(1)).await;
        assert_eq!(default.events.count_of_type("run.time_updated"), 0);
    }

    #[tokio::test]
    async fn test_malformed_spreadsheet_fails_validation() {
        let services = FakeServices::new().with_reader(FakeSpreadsheet::malformed("no header row"));
        let h = Harness::new(services);

        let report = h.run(h.request(14)).await;

        let failure = report.outcome.failure().cloned().unwrap();
        assert_eq!(failure.step_key, "read_spreadsheet");
        assert_eq!(failure.category, ErrorCategory::Validation);
        assert!(h.services.database.statements().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_rows_abort_before_writes() {
        let h = Harness::with_rows(vec![order_row(2, "A-1", "사과", "many")]);

        let report = h.run(h.request(14)).await;

        let failure = report.outcome.failure().cloned().unwrap();
        assert_eq!(failure.step_key, "validate_rows");
        assert_eq!(failure.causes, vec!["line 2: 수량 'many' is not a positive whole number".to_string()]);
        assert!(h.services.database.statements().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_notifier_only_warns() {
        let services = FakeServices::new()
            .with_reader(FakeSpreadsheet::with_rows(sample_rows()))
            .with_notifier(FakeNotifier::unreachable());
        let h = Harness::new(services);

        let report = h.run(h.request(14)).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert!(report.warnings.iter().any(|w| w.contains("not announced")));
        assert!(report.contained_failures.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_notification_keeps_run_successful() {
        let services = FakeServices::new()
            .with_reader(FakeSpreadsheet::with_rows(sample_rows()))
            .with_notifier(FakeNotifier::rejecting());
        let h = Harness::new(services);

        let report = h.run(h.request(14)).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.uploads.len(), 1);
        assert!(report.warnings.iter().any(|w| w.contains("notification for batch")));
        assert_eq!(h.services.database.statements_matching("SET Status = 'COMPLETED'").len(), 1);
    }

    #[tokio::test]
    async fn test_upload_failure_skips_completion() {
        let services = FakeServices::new()
            .with_reader(FakeSpreadsheet::with_rows(sample_rows()))
            .with_storage(FakeStorage::failing());
        let h = Harness::new(services);

        let report = h.run(h.request(14)).await;

        assert_eq!(report.outcome.failure().unwrap().step_key, "upload_invoice_file");
        assert!(h.services.notifier.sent().is_empty());
        assert!(h.services.database.statements_matching("SET Status = 'COMPLETED'").is_empty());
        assert_eq!(report.steps_executed, 11);
    }

    #[tokio::test]
    async fn test_registry_order_drives_execution() {
        let store = InMemoryConfigStore::new(vec![
            CommonCode::new(MAIN_STEP_GROUP, "validate_rows", "Check rows", 20),
            CommonCode::new(MAIN_STEP_GROUP, "read_spreadsheet", "Load sheet", 10),
            CommonCode::new(MAIN_STEP_GROUP, "warp_drive", "Engage", 15),
        ]);
        let h = Harness::with_rows(sample_rows()).with_store(store);

        let report = h.run(h.request(14)).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(h.progress.step_names(), vec!["Load sheet", "Check rows"]);
        assert!(report.warnings.iter().any(|w| w.contains("warp_drive")));
    }

    #[tokio::test]
    async fn test_registry_outage_falls_back_to_defaults() {
        let h = Harness::with_rows(sample_rows()).with_store(InMemoryConfigStore::unavailable());

        let report = h.run(h.request(14)).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.steps_executed, 14);
        assert!(report.warnings.iter().any(|w| w.contains("built-in ordering")));
    }

    #[tokio::test]
    async fn test_sales_sub_pipeline() {
        let pending = |id: i64| -> DbRow {
            [("SalesOrderId".to_string(), json!(id)), ("Amount".to_string(), json!(9900))]
                .into_iter()
                .collect()
        };
        let services = FakeServices::new().with_database(
            FakeDatabase::new().with_query_rows("FROM SalesOrder", vec![pending(1), pending(2)]),
        );
        let h = Harness::new(services);

        let report = h.executor().process_sales_input_data(&h.log, &h.progress).await;

        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.steps_executed, 3);
        assert!(report.warnings.is_empty());
        assert_eq!(h.services.database.statements_matching("INSERT INTO SalesInput").len(), 2);
        assert_eq!(h.services.database.statements_matching("UPDATE SalesOrder").len(), 1);
        assert_eq!(h.completed_events(), 1);
    }

    #[tokio::test]
    async fn test_sales_without_pending_orders_is_no_data() {
        let h = Harness::new(FakeServices::new());

        let report = h.executor().process_sales_input_data(&h.log, &h.progress).await;

        assert_eq!(report.outcome, RunOutcome::NoData("no pending sales orders".to_string()));
        assert!(h.services.database.statements_matching("INSERT").is_empty());
    }

    #[tokio::test]
    async fn test_sequential_runs_reuse_tracker() {
        let h = Harness::with_rows(sample_rows());

        let first = h.run(h.request(2)).await;
        let second = h.run(h.request(2)).await;

        assert_eq!(first.outcome, RunOutcome::Success);
        assert_eq!(second.outcome, RunOutcome::Success);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(h.completed_events(), 2);
    }
}
