//! Error taxonomy for plan parsing, worker execution, and orchestration.
//!
//! Worker-side failures (`WorkerError`) are always infrastructure problems and
//! are surfaced distinctly from validation failures, which are successful
//! worker calls that report `passed == false`. Callers use the distinction to
//! decide between retrying the run and revisiting the plan itself.

use thiserror::Error;

use crate::plan::ValidationResult;

/// Structural errors raised while turning a plan document into a `Plan`.
///
/// All of these are fatal and surface before any work is submitted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("module '{module}' depends on '{dependency}', which is not declared in an earlier phase")]
    DanglingDependency { module: String, dependency: String },

    #[error("duplicate module name: '{name}'")]
    DuplicateModule { name: String },

    #[error("plan has no phases")]
    EmptyPlan,

    #[error("phase {index} has no modules")]
    EmptyPhase { index: usize },

    #[error("module name '{name}' is reserved")]
    ReservedModuleName { name: String },

    #[error("malformed plan document: {0}")]
    Document(String),
}

impl From<serde_yaml::Error> for ParseError {
    fn from(err: serde_yaml::Error) -> Self {
        ParseError::Document(err.to_string())
    }
}

/// Infrastructure failures reported by a `Worker` implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerError {
    #[error("worker unreachable: {0}")]
    Unreachable(String),

    #[error("worker timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("worker crashed: {0}")]
    Crashed(String),
}

/// Why a module (or the integration stage) ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleFailure {
    /// The worker itself broke. No retry budget is spent on these; the run
    /// needs an ops fix, not another fix attempt.
    #[error("infrastructure failure: {0}")]
    Infrastructure(WorkerError),

    /// Validation still failing on the final attempt; carries the last
    /// validation result for escalation.
    #[error("validation failed after {attempts} attempts")]
    ValidationExhausted {
        attempts: u32,
        last: ValidationResult,
    },

    /// The run was cancelled while this module was still in flight.
    #[error("cancelled before completion")]
    Cancelled,
}

/// Top-level orchestration errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("module '{module}': {failure}")]
    Module { module: String, failure: ModuleFailure },

    #[error("phase {phase} aborted; failed modules: {failed:?}")]
    PhaseAborted { phase: usize, failed: Vec<String> },
}
