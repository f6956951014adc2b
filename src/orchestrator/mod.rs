//! Top-level driver: parse → phases in order → integration → report.
//!
//! The run is a small state machine. `PhaseExecuting(i)` only advances to
//! `PhaseExecuting(i + 1)` once phase `i` fully passed; a failed phase halts
//! at `Aborted` without submitting any later phase's modules, because the
//! plan's dependency graph assumed the failed module's success. Integration
//! is not a special case — it is the single module of an implicit final
//! phase, run through the same scheduler and retry loop as everything else.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, ParseError};
use crate::plan::{self, ModuleSpec, ModuleState, Phase, Plan, INTEGRATION_MODULE};
use crate::report::{BuildReport, ModuleReport, PhaseReport, RunStatus, UnitReport};
use crate::retry::ModuleOutcome;
use crate::scheduler::{PhaseResult, PhaseScheduler};
use crate::worker::WorkerPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    PhaseExecuting(usize),
    Integrating,
    Done,
    Aborted,
}

/// Orchestrator-wide mutable state. Owned exclusively by the run loop and
/// mutated only between phase barriers (single-writer discipline); in-flight
/// module state lives inside each retry loop, never here.
pub struct BuildState {
    plan: Plan,
    outcomes: HashMap<String, ModuleOutcome>,
    integration: Option<ModuleOutcome>,
    phase_cursor: usize,
}

impl BuildState {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            outcomes: HashMap::new(),
            integration: None,
            phase_cursor: 0,
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Index of the next phase to execute.
    pub fn phase_cursor(&self) -> usize {
        self.phase_cursor
    }

    pub fn outcome(&self, module: &str) -> Option<&ModuleOutcome> {
        self.outcomes.get(module)
    }

    pub fn integration(&self) -> Option<&ModuleOutcome> {
        self.integration.as_ref()
    }

    fn record_phase(&mut self, result: PhaseResult) {
        let advanced = result.success();
        for outcome in result.outcomes {
            self.outcomes.insert(outcome.module.clone(), outcome);
        }
        if advanced {
            self.phase_cursor += 1;
        }
    }

    fn record_integration(&mut self, outcome: ModuleOutcome) {
        self.integration = Some(outcome);
    }

    fn report(&self, run_id: Uuid, status: RunStatus) -> BuildReport {
        let phases = self
            .plan
            .phases
            .iter()
            .map(|phase| PhaseReport {
                index: phase.index,
                modules: phase
                    .modules
                    .iter()
                    .map(|module| match self.outcomes.get(&module.name) {
                        Some(outcome) => ModuleReport {
                            name: module.name.clone(),
                            final_state: outcome.state,
                            attempts: outcome.attempts,
                            failure: outcome.failure.as_ref().map(|f| f.to_string()),
                        },
                        // Phase never ran; the module stays pending in the
                        // report so partial progress is visible.
                        None => ModuleReport {
                            name: module.name.clone(),
                            final_state: ModuleState::Pending,
                            attempts: 0,
                            failure: None,
                        },
                    })
                    .collect(),
            })
            .collect();

        BuildReport {
            plan_id: self.plan.id.clone(),
            run_id,
            overall_status: status,
            phases,
            integration: self.integration.as_ref().map(|outcome| UnitReport {
                final_state: outcome.state,
                attempts: outcome.attempts,
                failure: outcome.failure.as_ref().map(|f| f.to_string()),
            }),
        }
    }
}

/// Cancels a run in progress. Already-passed modules keep their recorded
/// state; in-flight module loops are aborted.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct Orchestrator {
    pool: Arc<WorkerPool>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            pool,
            cancel_tx: Arc::new(tx),
            cancel_rx: rx,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Parse a plan document and drive it to completion.
    pub async fn run(&self, source: &str) -> Result<BuildReport, ParseError> {
        debug!("parsing plan document");
        let plan = plan::parser::parse(source)?;
        Ok(self.run_plan(plan).await)
    }

    /// Drive an already-parsed plan to completion. Execution failures are
    /// not errors at this level: they surface in the report as `Aborted`
    /// with every module's terminal state enumerated.
    pub async fn run_plan(&self, plan: Plan) -> BuildReport {
        let run_id = Uuid::new_v4();
        info!(plan = %plan.id, %run_id, phases = plan.phases.len(), modules = plan.module_count(), "run started");

        let scheduler = PhaseScheduler::new(Arc::clone(&self.pool), self.cancel_rx.clone());
        let mut build = BuildState::new(plan);
        let mut state = RunState::PhaseExecuting(0);

        loop {
            match state {
                RunState::PhaseExecuting(index) => {
                    let phase = build.plan().phases[index].clone();
                    let result = scheduler.run_phase(&phase).await;
                    let success = result.success();
                    if !success {
                        let error = OrchestratorError::PhaseAborted {
                            phase: index,
                            failed: result.failed_modules(),
                        };
                        warn!(%error, "halting run");
                    }
                    build.record_phase(result);
                    state = if !success {
                        RunState::Aborted
                    } else if index + 1 < build.plan().phases.len() {
                        RunState::PhaseExecuting(index + 1)
                    } else {
                        RunState::Integrating
                    };
                }
                RunState::Integrating => {
                    info!("all phases passed, running integration stage");
                    // The synthetic final phase: one module depending on all.
                    let phase = Phase {
                        index: build.plan().phases.len(),
                        modules: vec![integration_module(build.plan())],
                    };
                    let mut result = scheduler.run_phase(&phase).await;
                    let success = result.success();
                    if let Some(outcome) = result.outcomes.pop() {
                        build.record_integration(outcome);
                    }
                    state = if success {
                        RunState::Done
                    } else {
                        RunState::Aborted
                    };
                }
                RunState::Done | RunState::Aborted => break,
            }
        }

        let status = if state == RunState::Done {
            RunStatus::Done
        } else {
            RunStatus::Aborted
        };
        info!(?status, "run finished");
        build.report(run_id, status)
    }
}

/// Build the synthetic integration module: its scope is wiring the completed
/// modules together and it depends on every module in the plan.
fn integration_module(plan: &Plan) -> ModuleSpec {
    ModuleSpec {
        name: INTEGRATION_MODULE.to_string(),
        scope: "wire together the outputs of all modules".to_string(),
        dependencies: plan.module_names(),
        expected_artifacts: Vec::new(),
    }
}
