//! End-to-end orchestrator behavior against scripted workers: phase
//! ordering, retry budgets, failure isolation, timing, and cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use stagehand::error::WorkerError;
use stagehand::orchestrator::Orchestrator;
use stagehand::plan::{parser, ModuleState, INTEGRATION_MODULE};
use stagehand::report::RunStatus;
use stagehand::testing::MockWorker;
use stagehand::worker::WorkerPool;

const TWO_PHASE_PLAN: &str = r#"
id: two-phase
phases:
  - modules:
      - name: core
        scope: core types
      - name: store
        scope: storage layer
  - modules:
      - name: api
        scope: public api
        dependencies: [core, store]
"#;

fn orchestrator(worker: Arc<MockWorker>) -> Orchestrator {
    let pool = Arc::new(WorkerPool::new(worker, 8, Duration::from_secs(5)));
    Orchestrator::new(pool)
}

fn module_report<'a>(
    report: &'a stagehand::report::BuildReport,
    name: &str,
) -> &'a stagehand::report::ModuleReport {
    report
        .phases
        .iter()
        .flat_map(|phase| phase.modules.iter())
        .find(|module| module.name == name)
        .unwrap_or_else(|| panic!("module '{name}' missing from report"))
}

#[tokio::test]
async fn full_run_passes_and_integrates() {
    let worker = Arc::new(MockWorker::new());
    let report = orchestrator(worker.clone())
        .run(TWO_PHASE_PLAN)
        .await
        .unwrap();

    assert_eq!(report.overall_status, RunStatus::Done);
    assert_eq!(report.exit_code(), 0);
    for name in ["core", "store", "api"] {
        let module = module_report(&report, name);
        assert_eq!(module.final_state, ModuleState::Passed);
        assert_eq!(module.attempts, 1);
    }
    let integration = report.integration.as_ref().unwrap();
    assert_eq!(integration.final_state, ModuleState::Passed);
    assert_eq!(integration.attempts, 1);
    assert_eq!(worker.build_calls(INTEGRATION_MODULE), 1);

    // Strict phase ordering: no second-phase build before the first phase's
    // barrier, and integration strictly last.
    let order = worker.build_order();
    let api = order.iter().position(|m| m == "api").unwrap();
    let core = order.iter().position(|m| m == "core").unwrap();
    let store = order.iter().position(|m| m == "store").unwrap();
    let integration = order.iter().position(|m| m == INTEGRATION_MODULE).unwrap();
    assert!(api > core && api > store);
    assert!(integration > api);
}

#[tokio::test]
async fn failed_module_blocks_later_phases_and_integration() {
    let worker = Arc::new(MockWorker::new());
    worker.always_fail_validation("core");
    let report = orchestrator(worker.clone())
        .run(TWO_PHASE_PLAN)
        .await
        .unwrap();

    assert_eq!(report.overall_status, RunStatus::Aborted);
    assert_eq!(report.exit_code(), 1);

    let core = module_report(&report, "core");
    assert_eq!(core.final_state, ModuleState::Failed);
    assert_eq!(core.attempts, 3);
    assert!(core.failure.as_ref().unwrap().contains("validation failed"));

    // The sibling in the same phase ran to completion.
    let store = module_report(&report, "store");
    assert_eq!(store.final_state, ModuleState::Passed);

    // Nothing from the second phase or the integration stage was ever
    // submitted to the pool.
    assert_eq!(worker.build_calls("api"), 0);
    assert_eq!(worker.validate_calls("api"), 0);
    assert_eq!(worker.build_calls(INTEGRATION_MODULE), 0);
    let api = module_report(&report, "api");
    assert_eq!(api.final_state, ModuleState::Pending);
    assert_eq!(api.attempts, 0);
    assert!(report.integration.is_none());
}

#[tokio::test]
async fn module_recovering_on_third_attempt_passes() {
    let worker = Arc::new(MockWorker::new());
    worker.fail_validations("core", 2);
    let report = orchestrator(worker.clone())
        .run(TWO_PHASE_PLAN)
        .await
        .unwrap();

    assert_eq!(report.overall_status, RunStatus::Done);
    let core = module_report(&report, "core");
    assert_eq!(core.final_state, ModuleState::Passed);
    assert_eq!(core.attempts, 3);
    assert_eq!(worker.validate_calls("core"), 3);
    assert_eq!(worker.fix_calls("core"), 2);
    assert_eq!(worker.build_calls("core"), 1);
}

#[tokio::test]
async fn infrastructure_error_aborts_without_consuming_retry_budget() {
    let worker = Arc::new(MockWorker::new());
    worker.fail_build("store", WorkerError::Unreachable("agent pool down".to_string()));
    let report = orchestrator(worker.clone())
        .run(TWO_PHASE_PLAN)
        .await
        .unwrap();

    assert_eq!(report.overall_status, RunStatus::Aborted);
    let store = module_report(&report, "store");
    assert_eq!(store.final_state, ModuleState::Failed);
    assert_eq!(store.attempts, 0);
    assert!(store.failure.as_ref().unwrap().contains("infrastructure"));
    assert_eq!(worker.validate_calls("store"), 0);
    assert_eq!(worker.fix_calls("store"), 0);
}

#[tokio::test]
async fn phase_wall_clock_tracks_slowest_module_not_sum() {
    let plan = parser::parse(
        r#"
id: timing
phases:
  - modules:
      - name: a
        scope: a
      - name: b
        scope: b
      - name: c
        scope: c
"#,
    )
    .unwrap();
    let worker = Arc::new(MockWorker::new());
    worker.delay_build("a", Duration::from_millis(100));
    worker.delay_build("b", Duration::from_millis(200));
    worker.delay_build("c", Duration::from_millis(50));

    let start = Instant::now();
    let report = orchestrator(worker).run_plan(plan).await;
    let elapsed = start.elapsed();

    assert_eq!(report.overall_status, RunStatus::Done);
    // Concurrent phase execution: ≈ max(100, 200, 50)ms, not the 350ms sum.
    assert!(elapsed >= Duration::from_millis(200), "finished too fast: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(340),
        "phase ran sequentially: {elapsed:?}"
    );
}

#[tokio::test]
async fn cancellation_preserves_passed_modules_in_report() {
    let plan = parser::parse(
        r#"
id: cancel
phases:
  - modules:
      - name: fast
        scope: fast
      - name: slow
        scope: slow
"#,
    )
    .unwrap();
    let worker = Arc::new(MockWorker::new());
    worker.delay_build("slow", Duration::from_secs(30));

    let orchestrator = Arc::new(orchestrator(worker));
    let cancel = orchestrator.cancel_handle();
    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run_plan(plan).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancelled run should finish promptly")
        .unwrap();

    assert_eq!(report.overall_status, RunStatus::Aborted);
    assert_eq!(
        module_report(&report, "fast").final_state,
        ModuleState::Passed
    );
    assert_eq!(
        module_report(&report, "slow").final_state,
        ModuleState::Failed
    );
}

#[tokio::test]
async fn parse_failure_surfaces_before_any_execution() {
    let worker = Arc::new(MockWorker::new());
    let err = orchestrator(worker.clone())
        .run("id: bad\nphases: []\n")
        .await
        .unwrap_err();

    assert_eq!(err, stagehand::error::ParseError::EmptyPlan);
    assert_eq!(worker.total_builds(), 0);
}
