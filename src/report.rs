//! Final build report: every module's terminal state and attempt count,
//! enumerated even for aborted runs so partial progress is never hidden.

use serde::Serialize;
use uuid::Uuid;

use crate::plan::ModuleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub plan_id: String,
    pub run_id: Uuid,
    pub overall_status: RunStatus,
    pub phases: Vec<PhaseReport>,
    /// Absent when the integration stage was never reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration: Option<UnitReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub index: usize,
    pub modules: Vec<ModuleReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub name: String,
    pub final_state: ModuleState,
    pub attempts: u32,
    /// Human-readable failure diagnosis, present only for failed modules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub final_state: ModuleState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl BuildReport {
    /// True when every module and the integration stage ended `Passed`.
    pub fn all_passed(&self) -> bool {
        let modules_passed = self
            .phases
            .iter()
            .flat_map(|phase| phase.modules.iter())
            .all(|module| module.final_state == ModuleState::Passed);
        let integration_passed = self
            .integration
            .as_ref()
            .is_some_and(|unit| unit.final_state == ModuleState::Passed);
        modules_passed && integration_passed
    }

    /// Process exit code for the CLI surface: 0 only for a fully passed run.
    pub fn exit_code(&self) -> i32 {
        if self.overall_status == RunStatus::Done && self.all_passed() {
            0
        } else {
            1
        }
    }

    /// Names and diagnoses of every module that did not pass, in plan order.
    pub fn failures(&self) -> Vec<(String, String)> {
        let mut failures: Vec<(String, String)> = self
            .phases
            .iter()
            .flat_map(|phase| phase.modules.iter())
            .filter(|module| module.final_state == ModuleState::Failed)
            .map(|module| {
                (
                    module.name.clone(),
                    module
                        .failure
                        .clone()
                        .unwrap_or_else(|| "failed".to_string()),
                )
            })
            .collect();
        if let Some(unit) = &self.integration {
            if unit.final_state == ModuleState::Failed {
                failures.push((
                    crate::plan::INTEGRATION_MODULE.to_string(),
                    unit.failure.clone().unwrap_or_else(|| "failed".to_string()),
                ));
            }
        }
        failures
    }
}
