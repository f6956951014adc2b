//! The opaque worker capability and the concurrency primitives around it.
//!
//! A `Worker` is anything that can build a module, validate a build output,
//! and fix a build output against a list of issues — a shell command runner,
//! a remote job executor, a human behind a queue. The orchestrator never
//! looks inside; any implementation of the trait is interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::plan::{ModuleSpec, ValidationIssue, ValidationResult};

pub mod pool;
pub mod shell;

pub use pool::{WorkHandle, WorkResult, WorkRole, WorkUnit, WorkerPool};
pub use shell::{ShellWorker, WorkerCommands};

/// Output of a build or fix pass. Opaque to the orchestrator; only the worker
/// interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub module: String,
    pub summary: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

/// External capability performing build/validate/fix.
///
/// Errors from these methods are always infrastructure failures. A build that
/// produces bad code is still a successful `build` call; the badness surfaces
/// later as a `ValidationResult` with `passed == false`.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn build(&self, module: &ModuleSpec) -> Result<BuildOutput, WorkerError>;

    async fn validate(
        &self,
        output: &BuildOutput,
        module: &ModuleSpec,
    ) -> Result<ValidationResult, WorkerError>;

    async fn fix(
        &self,
        output: &BuildOutput,
        issues: &[ValidationIssue],
    ) -> Result<BuildOutput, WorkerError>;
}
