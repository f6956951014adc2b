//! Scripted `Worker` implementation for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::plan::{ModuleSpec, Severity, ValidationIssue, ValidationResult};
use crate::worker::{BuildOutput, Worker};

/// Per-module call counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallCounts {
    pub builds: usize,
    pub validations: usize,
    pub fixes: usize,
}

#[derive(Default)]
struct Script {
    build_delay: Option<Duration>,
    build_error: Option<WorkerError>,
    /// Queued validation outcomes; an exhausted queue means pass.
    validations: VecDeque<bool>,
}

/// Worker whose behavior is scripted per module: queued validation outcomes,
/// artificial build delays, injected infrastructure errors, and call counters
/// for asserting exactly what the orchestrator submitted.
///
/// Unscripted modules build instantly and pass validation on the first
/// attempt.
#[derive(Default)]
pub struct MockWorker {
    scripts: Mutex<HashMap<String, Script>>,
    counts: Mutex<HashMap<String, CallCounts>>,
    build_order: Mutex<Vec<String>>,
}

impl MockWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `n` failing validations for `module` before it passes.
    pub fn fail_validations(&self, module: &str, n: usize) {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(module.to_string()).or_default();
        for _ in 0..n {
            script.validations.push_back(false);
        }
    }

    /// Make `module` fail validation on every attempt.
    pub fn always_fail_validation(&self, module: &str) {
        // More than any retry budget will ever consume.
        self.fail_validations(module, 16);
    }

    /// Delay `module`'s build by `delay`.
    pub fn delay_build(&self, module: &str, delay: Duration) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(module.to_string()).or_default().build_delay = Some(delay);
    }

    /// Make `module`'s build fail with an infrastructure error.
    pub fn fail_build(&self, module: &str, error: WorkerError) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(module.to_string()).or_default().build_error = Some(error);
    }

    pub fn counts(&self, module: &str) -> CallCounts {
        self.counts
            .lock()
            .unwrap()
            .get(module)
            .copied()
            .unwrap_or_default()
    }

    pub fn build_calls(&self, module: &str) -> usize {
        self.counts(module).builds
    }

    pub fn validate_calls(&self, module: &str) -> usize {
        self.counts(module).validations
    }

    pub fn fix_calls(&self, module: &str) -> usize {
        self.counts(module).fixes
    }

    pub fn total_builds(&self) -> usize {
        self.counts.lock().unwrap().values().map(|c| c.builds).sum()
    }

    /// Module names in the order their builds were submitted.
    pub fn build_order(&self) -> Vec<String> {
        self.build_order.lock().unwrap().clone()
    }

    fn bump(&self, module: &str, update: impl FnOnce(&mut CallCounts)) {
        let mut counts = self.counts.lock().unwrap();
        update(counts.entry(module.to_string()).or_default());
    }
}

#[async_trait]
impl Worker for MockWorker {
    async fn build(&self, module: &ModuleSpec) -> Result<BuildOutput, WorkerError> {
        self.bump(&module.name, |c| c.builds += 1);
        self.build_order.lock().unwrap().push(module.name.clone());
        let (delay, error) = {
            let scripts = self.scripts.lock().unwrap();
            match scripts.get(&module.name) {
                Some(script) => (script.build_delay, script.build_error.clone()),
                None => (None, None),
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = error {
            return Err(error);
        }
        Ok(BuildOutput {
            module: module.name.clone(),
            summary: format!("built {}", module.name),
            artifacts: module.expected_artifacts.clone(),
        })
    }

    async fn validate(
        &self,
        _output: &BuildOutput,
        module: &ModuleSpec,
    ) -> Result<ValidationResult, WorkerError> {
        self.bump(&module.name, |c| c.validations += 1);
        let pass = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts
                .get_mut(&module.name)
                .and_then(|script| script.validations.pop_front())
                .unwrap_or(true)
        };
        if pass {
            Ok(ValidationResult::pass())
        } else {
            Ok(ValidationResult::fail(vec![ValidationIssue {
                severity: Severity::Error,
                description: format!("{} does not satisfy its scope yet", module.name),
                location: None,
            }]))
        }
    }

    async fn fix(
        &self,
        output: &BuildOutput,
        _issues: &[ValidationIssue],
    ) -> Result<BuildOutput, WorkerError> {
        self.bump(&output.module, |c| c.fixes += 1);
        Ok(BuildOutput {
            module: output.module.clone(),
            summary: format!("fixed {}", output.module),
            artifacts: output.artifacts.clone(),
        })
    }
}
