//! Default worker backed by configurable shell commands.
//!
//! Each capability maps to one command. Context is passed through environment
//! variables (`STAGEHAND_MODULE`, `STAGEHAND_SCOPE`, `STAGEHAND_ARTIFACTS`,
//! `STAGEHAND_BUILD_SUMMARY`, `STAGEHAND_ISSUES`), so commands stay plain
//! executables with no wrapper protocol.
//!
//! Validation commands may print a JSON `ValidationResult` to stdout:
//!
//! ```json
//! {"passed": false, "issues": [{"severity": "error", "description": "..."}]}
//! ```
//!
//! Without JSON output, a zero exit code counts as a pass and a non-zero exit
//! as a failed validation. Build and fix commands that exit non-zero are
//! infrastructure errors — a worker that cannot complete its own command has
//! crashed, it has not produced a reviewable result.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::{BuildOutput, Worker};
use crate::error::WorkerError;
use crate::plan::{ModuleSpec, Severity, ValidationIssue, ValidationResult};

/// The three commands backing a `ShellWorker`, typically read from the plan
/// document's `worker:` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCommands {
    pub build: String,
    pub validate: String,
    pub fix: String,
}

pub struct ShellWorker {
    commands: WorkerCommands,
    working_dir: Option<PathBuf>,
}

struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl ShellWorker {
    pub fn new(commands: WorkerCommands) -> Self {
        Self {
            commands,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    async fn run_command(
        &self,
        command: &str,
        env: &[(&str, String)],
    ) -> Result<CommandOutput, WorkerError> {
        let words = shell_words::split(command)
            .map_err(|e| WorkerError::Unreachable(format!("unparseable command '{command}': {e}")))?;
        let (program, args) = words
            .split_first()
            .ok_or_else(|| WorkerError::Unreachable("empty worker command".to_string()))?;

        debug!(%program, ?args, "running worker command");
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| WorkerError::Unreachable(format!("failed to spawn '{program}': {e}")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl Worker for ShellWorker {
    async fn build(&self, module: &ModuleSpec) -> Result<BuildOutput, WorkerError> {
        let env = [
            ("STAGEHAND_MODULE", module.name.clone()),
            ("STAGEHAND_SCOPE", module.scope.clone()),
            ("STAGEHAND_ARTIFACTS", module.expected_artifacts.join(",")),
        ];
        let output = self.run_command(&self.commands.build, &env).await?;
        if !output.success {
            return Err(WorkerError::Crashed(format!(
                "build command exited with {:?}: {}",
                output.code,
                output.stderr.trim()
            )));
        }
        Ok(BuildOutput {
            module: module.name.clone(),
            summary: output.stdout.trim().to_string(),
            artifacts: module.expected_artifacts.clone(),
        })
    }

    async fn validate(
        &self,
        output: &BuildOutput,
        module: &ModuleSpec,
    ) -> Result<ValidationResult, WorkerError> {
        let env = [
            ("STAGEHAND_MODULE", module.name.clone()),
            ("STAGEHAND_SCOPE", module.scope.clone()),
            ("STAGEHAND_BUILD_SUMMARY", output.summary.clone()),
        ];
        let result = self.run_command(&self.commands.validate, &env).await?;
        Ok(parse_validation_output(&result))
    }

    async fn fix(
        &self,
        output: &BuildOutput,
        issues: &[ValidationIssue],
    ) -> Result<BuildOutput, WorkerError> {
        let env = [
            ("STAGEHAND_MODULE", output.module.clone()),
            ("STAGEHAND_BUILD_SUMMARY", output.summary.clone()),
            (
                "STAGEHAND_ISSUES",
                serde_json::to_string(issues).unwrap_or_default(),
            ),
        ];
        let result = self.run_command(&self.commands.fix, &env).await?;
        if !result.success {
            return Err(WorkerError::Crashed(format!(
                "fix command exited with {:?}: {}",
                result.code,
                result.stderr.trim()
            )));
        }
        Ok(BuildOutput {
            module: output.module.clone(),
            summary: result.stdout.trim().to_string(),
            artifacts: output.artifacts.clone(),
        })
    }
}

fn parse_validation_output(output: &CommandOutput) -> ValidationResult {
    if let Ok(result) = serde_json::from_str::<ValidationResult>(output.stdout.trim()) {
        return result;
    }
    if output.success {
        ValidationResult::pass()
    } else {
        let description = if output.stderr.trim().is_empty() {
            format!("validation command exited with {:?}", output.code)
        } else {
            output.stderr.trim().to_string()
        };
        ValidationResult::fail(vec![ValidationIssue {
            severity: Severity::Error,
            description,
            location: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str) -> ModuleSpec {
        ModuleSpec {
            name: name.to_string(),
            scope: format!("build {name}"),
            dependencies: Vec::new(),
            expected_artifacts: vec![format!("src/{name}.rs")],
        }
    }

    fn worker(build: &str, validate: &str, fix: &str) -> ShellWorker {
        ShellWorker::new(WorkerCommands {
            build: build.to_string(),
            validate: validate.to_string(),
            fix: fix.to_string(),
        })
    }

    #[tokio::test]
    async fn build_captures_stdout_and_artifacts() {
        let worker = worker("echo built-ok", "true", "true");
        let output = worker.build(&module("core")).await.unwrap();
        assert_eq!(output.summary, "built-ok");
        assert_eq!(output.artifacts, vec!["src/core.rs"]);
    }

    #[tokio::test]
    async fn failing_build_command_is_infrastructure_error() {
        let worker = worker("false", "true", "true");
        let err = worker.build(&module("core")).await.unwrap_err();
        assert!(matches!(err, WorkerError::Crashed(_)));
    }

    #[tokio::test]
    async fn missing_program_is_unreachable() {
        let worker = worker("definitely-not-a-real-binary-xyz", "true", "true");
        let err = worker.build(&module("core")).await.unwrap_err();
        assert!(matches!(err, WorkerError::Unreachable(_)));
    }

    #[tokio::test]
    async fn validate_parses_structured_json() {
        let worker = worker(
            "echo built",
            r#"echo '{"passed": false, "issues": [{"severity": "error", "description": "missing tests"}]}'"#,
            "true",
        );
        let build = worker.build(&module("core")).await.unwrap();
        let result = worker.validate(&build, &module("core")).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.issues[0].description, "missing tests");
    }

    #[tokio::test]
    async fn validate_falls_back_to_exit_code() {
        let worker = worker("echo built", "true", "true");
        let build = worker.build(&module("core")).await.unwrap();
        assert!(worker.validate(&build, &module("core")).await.unwrap().passed);

        let failing = worker_with_validate("false");
        let result = failing.validate(&build, &module("core")).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.issues.len(), 1);
    }

    fn worker_with_validate(validate: &str) -> ShellWorker {
        worker("echo built", validate, "true")
    }
}
