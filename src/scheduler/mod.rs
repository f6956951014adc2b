//! Phase scheduler: fire-all-then-barrier execution of a phase's modules.
//!
//! Every module in a phase is spawned before any result is awaited, so phase
//! wall-clock time tracks the slowest module, not the sum. Modules within a
//! phase have no relative ordering guarantee. A failed module does not abort
//! its running siblings — partial results are worth keeping — but the phase
//! as a whole fails and the next phase is never started.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::error::WorkerError;
use crate::plan::Phase;
use crate::retry::{ModuleOutcome, RetryLoopController};
use crate::worker::WorkerPool;

/// Result of one phase's barrier: every module's terminal outcome.
#[derive(Debug)]
pub struct PhaseResult {
    pub index: usize,
    pub outcomes: Vec<ModuleOutcome>,
    /// Whether the run was cancelled while this phase was in flight.
    pub cancelled: bool,
}

impl PhaseResult {
    pub fn success(&self) -> bool {
        !self.cancelled && self.outcomes.iter().all(|o| o.passed())
    }

    pub fn failed_modules(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed())
            .map(|o| o.module.clone())
            .collect()
    }
}

pub struct PhaseScheduler {
    pool: Arc<WorkerPool>,
    cancel: watch::Receiver<bool>,
}

impl PhaseScheduler {
    pub fn new(pool: Arc<WorkerPool>, cancel: watch::Receiver<bool>) -> Self {
        Self { pool, cancel }
    }

    /// Run every module in the phase concurrently and wait for all of them to
    /// reach a terminal state.
    ///
    /// On cancellation, in-flight module tasks are aborted and reported as
    /// failed; outcomes already collected (including `Passed` ones) are
    /// preserved for the report.
    pub async fn run_phase(&self, phase: &Phase) -> PhaseResult {
        let total = phase.modules.len();
        info!(phase = phase.index, modules = total, "phase started");

        let mut abort_handles = Vec::with_capacity(total);
        let mut tasks = FuturesUnordered::new();
        for module in &phase.modules {
            let controller = RetryLoopController::new(Arc::clone(&self.pool));
            let spec = module.clone();
            let name = spec.name.clone();
            let handle = tokio::spawn(async move { controller.run(&spec).await });
            abort_handles.push(handle.abort_handle());
            tasks.push(async move { (name, handle.await) });
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut cancel = self.cancel.clone();
        let mut cancelled = false;
        let mut cancel_open = true;
        while outcomes.len() < total {
            tokio::select! {
                Some((name, joined)) = tasks.next() => {
                    outcomes.push(join_outcome(name, joined));
                }
                changed = cancel.changed(), if !cancelled && cancel_open => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            warn!(phase = phase.index, "cancelling in-flight modules");
                            cancelled = true;
                            for handle in &abort_handles {
                                handle.abort();
                            }
                        }
                        Ok(()) => {}
                        Err(_) => cancel_open = false,
                    }
                }
            }
        }

        let passed = outcomes.iter().filter(|o| o.passed()).count();
        info!(
            phase = phase.index,
            passed,
            failed = total - passed,
            "phase barrier reached"
        );
        PhaseResult {
            index: phase.index,
            outcomes,
            cancelled,
        }
    }
}

fn join_outcome(name: String, joined: Result<ModuleOutcome, JoinError>) -> ModuleOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) if err.is_cancelled() => ModuleOutcome::cancelled(&name),
        Err(err) => {
            warn!(module = %name, %err, "module task panicked");
            ModuleOutcome {
                failure: Some(crate::error::ModuleFailure::Infrastructure(
                    WorkerError::Crashed(format!("module task panicked: {err}")),
                )),
                ..ModuleOutcome::cancelled(&name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ModuleSpec;
    use crate::testing::MockWorker;
    use std::time::Duration;

    fn phase(index: usize, names: &[&str]) -> Phase {
        Phase {
            index,
            modules: names
                .iter()
                .map(|name| ModuleSpec {
                    name: name.to_string(),
                    scope: format!("build {name}"),
                    dependencies: Vec::new(),
                    expected_artifacts: Vec::new(),
                })
                .collect(),
        }
    }

    fn scheduler(worker: Arc<MockWorker>) -> (PhaseScheduler, watch::Sender<bool>) {
        let pool = Arc::new(WorkerPool::new(worker, 8, Duration::from_secs(5)));
        let (tx, rx) = watch::channel(false);
        (PhaseScheduler::new(pool, rx), tx)
    }

    #[tokio::test]
    async fn all_modules_reach_terminal_state() {
        let worker = Arc::new(MockWorker::new());
        let (scheduler, _cancel) = scheduler(worker);
        let result = scheduler.run_phase(&phase(0, &["a", "b", "c"])).await;

        assert!(result.success());
        assert_eq!(result.outcomes.len(), 3);
    }

    #[tokio::test]
    async fn failed_module_does_not_abort_siblings() {
        let worker = Arc::new(MockWorker::new());
        worker.always_fail_validation("bad");
        let (scheduler, _cancel) = scheduler(worker.clone());
        let result = scheduler.run_phase(&phase(0, &["bad", "good"])).await;

        assert!(!result.success());
        assert_eq!(result.failed_modules(), vec!["bad"]);
        // The sibling ran to completion despite the failure.
        let good = result
            .outcomes
            .iter()
            .find(|o| o.module == "good")
            .unwrap();
        assert!(good.passed());
        assert_eq!(worker.validate_calls("good"), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_but_keeps_finished_outcomes() {
        let worker = Arc::new(MockWorker::new());
        worker.delay_build("slow", Duration::from_secs(30));
        let (scheduler, cancel) = scheduler(worker);

        let phase = phase(0, &["fast", "slow"]);
        let run = scheduler.run_phase(&phase);
        let result = tokio::join!(run, async {
            // Give the fast module time to finish before aborting the phase.
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.send(true).unwrap();
        })
        .0;

        assert!(result.cancelled);
        assert!(!result.success());
        let fast = result
            .outcomes
            .iter()
            .find(|o| o.module == "fast")
            .unwrap();
        assert!(fast.passed());
        let slow = result
            .outcomes
            .iter()
            .find(|o| o.module == "slow")
            .unwrap();
        assert!(!slow.passed());
    }
}
