//! Bounded build → validate → fix retry loop for one module.
//!
//! The loop submits exactly one `Build` per target, at most three `Validate`
//! passes, and at most two `Fix` passes. The cap is a hard ceiling, not
//! configuration: it bounds worst-case latency and forces escalation to the
//! caller instead of looping on an unresolvable defect. Infrastructure errors
//! (worker unreachable, timeout, crash) end the loop immediately without
//! spending retry budget — they need an ops fix, not another attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ModuleFailure, OrchestratorError, WorkerError};
use crate::plan::{ModuleSpec, ModuleState, ValidationResult};
use crate::worker::{BuildOutput, WorkResult, WorkUnit, WorkerPool};

/// Hard ceiling on validation attempts per target: 3 validations, 2 fixes.
/// Attempt numbering starts at 1.
pub const MAX_VALIDATION_ATTEMPTS: u32 = 3;

/// Audit record for one validation attempt. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Iteration {
    pub module: String,
    pub attempt: u32,
    pub build_summary: String,
    pub validation: ValidationResult,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Terminal result of a module's retry loop.
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    pub module: String,
    /// Always `Passed` or `Failed`.
    pub state: ModuleState,
    /// Number of validation attempts actually made.
    pub attempts: u32,
    pub iterations: Vec<Iteration>,
    /// The build output that passed validation, if any.
    pub output: Option<BuildOutput>,
    pub failure: Option<ModuleFailure>,
}

impl ModuleOutcome {
    pub fn passed(&self) -> bool {
        self.state == ModuleState::Passed
    }

    /// Map a failed outcome onto the error taxonomy for reporting.
    pub fn error(&self) -> Option<OrchestratorError> {
        self.failure.as_ref().map(|failure| OrchestratorError::Module {
            module: self.module.clone(),
            failure: failure.clone(),
        })
    }

    pub fn cancelled(module: &str) -> Self {
        Self {
            module: module.to_string(),
            state: ModuleState::Failed,
            attempts: 0,
            iterations: Vec::new(),
            output: None,
            failure: Some(ModuleFailure::Cancelled),
        }
    }

    fn infrastructure(
        module: &str,
        error: WorkerError,
        attempts: u32,
        iterations: Vec<Iteration>,
    ) -> Self {
        Self {
            module: module.to_string(),
            state: ModuleState::Failed,
            attempts,
            iterations,
            output: None,
            failure: Some(ModuleFailure::Infrastructure(error)),
        }
    }
}

/// Drives one module (or the synthetic integration unit) to a terminal state.
///
/// Each controller owns its module's record exclusively; results flow back
/// only through the returned `ModuleOutcome`, never shared mutable state.
#[derive(Clone)]
pub struct RetryLoopController {
    pool: Arc<WorkerPool>,
}

impl RetryLoopController {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    pub async fn run(&self, module: &ModuleSpec) -> ModuleOutcome {
        info!(module = %module.name, state = ?ModuleState::Building, "build started");
        let built = self
            .pool
            .submit(WorkUnit::Build {
                module: module.clone(),
            })
            .wait()
            .await;
        let mut output = match built {
            Ok(WorkResult::Built(output)) => output,
            Ok(_) => {
                return ModuleOutcome::infrastructure(
                    &module.name,
                    mismatched_result(),
                    0,
                    Vec::new(),
                )
            }
            Err(error) => {
                warn!(module = %module.name, %error, "build failed before any validation");
                return ModuleOutcome::infrastructure(&module.name, error, 0, Vec::new());
            }
        };

        let mut iterations = Vec::new();
        let mut attempt = 1u32;
        loop {
            debug!(module = %module.name, attempt, state = ?ModuleState::Validating, "validating");
            let started_at = Utc::now();
            let validated = self
                .pool
                .submit(WorkUnit::Validate {
                    module: module.clone(),
                    output: output.clone(),
                })
                .wait()
                .await;
            let validation = match validated {
                Ok(WorkResult::Validated(validation)) => validation,
                Ok(_) => {
                    return ModuleOutcome::infrastructure(
                        &module.name,
                        mismatched_result(),
                        attempt,
                        iterations,
                    )
                }
                Err(error) => {
                    warn!(module = %module.name, attempt, %error, "validation submission failed");
                    return ModuleOutcome::infrastructure(&module.name, error, attempt, iterations);
                }
            };
            iterations.push(Iteration {
                module: module.name.clone(),
                attempt,
                build_summary: output.summary.clone(),
                validation: validation.clone(),
                started_at,
                completed_at: Utc::now(),
            });

            if validation.passed {
                info!(module = %module.name, attempt, "validation passed");
                return ModuleOutcome {
                    module: module.name.clone(),
                    state: ModuleState::Passed,
                    attempts: attempt,
                    iterations,
                    output: Some(output),
                    failure: None,
                };
            }
            if attempt == MAX_VALIDATION_ATTEMPTS {
                warn!(
                    module = %module.name,
                    attempts = attempt,
                    issues = validation.issues.len(),
                    "validation budget exhausted, escalating"
                );
                return ModuleOutcome {
                    module: module.name.clone(),
                    state: ModuleState::Failed,
                    attempts: attempt,
                    iterations,
                    output: Some(output),
                    failure: Some(ModuleFailure::ValidationExhausted {
                        attempts: attempt,
                        last: validation,
                    }),
                };
            }

            info!(
                module = %module.name,
                attempt,
                issues = validation.issues.len(),
                state = ?ModuleState::Fixing,
                "validation failed, dispatching fix"
            );
            let fixed = self
                .pool
                .submit(WorkUnit::Fix {
                    output: output.clone(),
                    issues: validation.issues.clone(),
                })
                .wait()
                .await;
            output = match fixed {
                Ok(WorkResult::Built(output)) => output,
                Ok(_) => {
                    return ModuleOutcome::infrastructure(
                        &module.name,
                        mismatched_result(),
                        attempt,
                        iterations,
                    )
                }
                Err(error) => {
                    warn!(module = %module.name, attempt, %error, "fix submission failed");
                    return ModuleOutcome::infrastructure(&module.name, error, attempt, iterations);
                }
            };
            attempt += 1;
        }
    }
}

fn mismatched_result() -> WorkerError {
    WorkerError::Crashed("worker returned a mismatched result kind".to_string())
}
