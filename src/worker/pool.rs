//! Worker pool: bounded-concurrency, timeout-enforcing work submission.
//!
//! The pool is a transport primitive only. It tags each unit of work with a
//! role, dispatches it to the underlying worker on a spawned task, and
//! delivers the result exactly once over a oneshot channel. Submission never
//! blocks the caller; a unit that outruns the pool timeout resolves to
//! `WorkerError::Timeout`, which is an infrastructure error, never a
//! validation failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};
use tracing::debug;

use super::{BuildOutput, Worker};
use crate::error::WorkerError;
use crate::plan::{ModuleSpec, ValidationIssue, ValidationResult};

/// Role tag carried by every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkRole {
    Build,
    Validate,
    Fix,
}

/// One unit of work. The payload is opaque to the pool.
#[derive(Debug, Clone)]
pub enum WorkUnit {
    Build {
        module: ModuleSpec,
    },
    Validate {
        module: ModuleSpec,
        output: BuildOutput,
    },
    Fix {
        output: BuildOutput,
        issues: Vec<ValidationIssue>,
    },
}

impl WorkUnit {
    pub fn role(&self) -> WorkRole {
        match self {
            WorkUnit::Build { .. } => WorkRole::Build,
            WorkUnit::Validate { .. } => WorkRole::Validate,
            WorkUnit::Fix { .. } => WorkRole::Fix,
        }
    }
}

/// Successful result of a unit of work.
#[derive(Debug, Clone)]
pub enum WorkResult {
    Built(BuildOutput),
    Validated(ValidationResult),
}

/// Handle to one in-flight submission. Awaiting it yields the result exactly
/// once.
pub struct WorkHandle {
    rx: oneshot::Receiver<Result<WorkResult, WorkerError>>,
}

impl WorkHandle {
    pub async fn wait(self) -> Result<WorkResult, WorkerError> {
        self.rx.await.unwrap_or_else(|_| {
            Err(WorkerError::Crashed(
                "worker task dropped without delivering a result".to_string(),
            ))
        })
    }
}

/// Dispatches build/validate/fix work to a `Worker` with bounded concurrency
/// and a per-submission timeout.
pub struct WorkerPool {
    worker: Arc<dyn Worker>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(worker: Arc<dyn Worker>, max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            worker,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout,
        }
    }

    /// Submit a unit of work. Returns immediately; the result is delivered
    /// through the handle. The timeout covers execution, not queueing behind
    /// the concurrency limit.
    pub fn submit(&self, unit: WorkUnit) -> WorkHandle {
        debug!(role = ?unit.role(), "submitting work unit");
        let (tx, rx) = oneshot::channel();
        let worker = Arc::clone(&self.worker);
        let semaphore = Arc::clone(&self.semaphore);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = tx.send(Err(WorkerError::Unreachable(
                        "worker pool closed".to_string(),
                    )));
                    return;
                }
            };
            let result = match tokio::time::timeout(timeout, dispatch(worker, unit)).await {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Timeout {
                    seconds: timeout.as_secs(),
                }),
            };
            drop(permit);
            let _ = tx.send(result);
        });

        WorkHandle { rx }
    }
}

async fn dispatch(worker: Arc<dyn Worker>, unit: WorkUnit) -> Result<WorkResult, WorkerError> {
    match unit {
        WorkUnit::Build { module } => worker.build(&module).await.map(WorkResult::Built),
        WorkUnit::Validate { module, output } => worker
            .validate(&output, &module)
            .await
            .map(WorkResult::Validated),
        WorkUnit::Fix { output, issues } => worker.fix(&output, &issues).await.map(WorkResult::Built),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWorker;
    use std::time::Instant;

    fn module(name: &str) -> ModuleSpec {
        ModuleSpec {
            name: name.to_string(),
            scope: format!("build {name}"),
            dependencies: Vec::new(),
            expected_artifacts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn delivers_build_result() {
        let worker = Arc::new(MockWorker::new());
        let pool = WorkerPool::new(worker, 2, Duration::from_secs(5));

        let result = pool
            .submit(WorkUnit::Build {
                module: module("core"),
            })
            .wait()
            .await
            .unwrap();

        match result {
            WorkResult::Built(output) => assert_eq!(output.module, "core"),
            other => panic!("expected build output, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_worker_times_out_as_infrastructure_error() {
        let worker = Arc::new(MockWorker::new());
        worker.delay_build("slow", Duration::from_millis(200));
        let pool = WorkerPool::new(worker, 2, Duration::from_millis(20));

        let err = pool
            .submit(WorkUnit::Build {
                module: module("slow"),
            })
            .wait()
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_pool_size() {
        let worker = Arc::new(MockWorker::new());
        worker.delay_build("a", Duration::from_millis(50));
        worker.delay_build("b", Duration::from_millis(50));
        let pool = WorkerPool::new(worker, 1, Duration::from_secs(5));

        let start = Instant::now();
        let first = pool.submit(WorkUnit::Build { module: module("a") });
        let second = pool.submit(WorkUnit::Build { module: module("b") });
        first.wait().await.unwrap();
        second.wait().await.unwrap();

        // With a single permit the two builds must serialize.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
