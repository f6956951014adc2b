//! In-memory plan model: phases, modules, and their lifecycle states.
//!
//! A `Plan` is immutable once parsed. Phases execute in list order, and a
//! module may only depend on modules declared in strictly earlier phases,
//! which is what makes every phase safe to run concurrently.

use serde::{Deserialize, Serialize};

pub mod parser;

/// Name of the synthetic module that wires all other modules together after
/// every phase has passed. Reserved; plans may not declare it themselves.
pub const INTEGRATION_MODULE: &str = "__integration__";

/// A parsed, validated build plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub id: String,
    pub phases: Vec<Phase>,
}

impl Plan {
    /// All module names in plan order, across every phase.
    pub fn module_names(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|phase| phase.modules.iter().map(|m| m.name.clone()))
            .collect()
    }

    pub fn module_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.modules.len()).sum()
    }
}

/// A barrier-synchronized group of mutually independent modules.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub index: usize,
    pub modules: Vec<ModuleSpec>,
}

/// Declarative description of one unit of build+validate work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    /// Opaque description of what to build; consumed by the worker, never
    /// interpreted by the orchestrator.
    pub scope: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub expected_artifacts: Vec<String>,
}

/// Lifecycle state of a module. Transitions are driven exclusively by the
/// retry loop; `Passed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Pending,
    Building,
    Validating,
    Fixing,
    Passed,
    Failed,
}

impl ModuleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleState::Passed | ModuleState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One problem reported by a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Outcome of one validation pass over a build output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            issues: Vec::new(),
        }
    }

    pub fn fail(issues: Vec<ValidationIssue>) -> Self {
        Self {
            passed: false,
            issues,
        }
    }
}
