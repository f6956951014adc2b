//! Plan document parsing and structural validation.
//!
//! Plan documents are YAML:
//!
//! ```yaml
//! id: my-plan
//! phases:
//!   - modules:
//!       - name: core
//!         scope: "implement the core types"
//!         dependencies: []
//!         expected_artifacts: ["src/core.rs"]
//! ```
//!
//! Parsing is a pure transform: the same document always yields the same
//! `Plan`, and nothing is executed until the whole document has been
//! validated.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{ModuleSpec, Phase, Plan, INTEGRATION_MODULE};
use crate::error::ParseError;
use crate::worker::shell::WorkerCommands;

/// Raw deserialized plan document, before structural validation.
///
/// The optional `worker` section configures the default shell-backed worker;
/// it is carried alongside the plan but never consulted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub id: String,
    pub phases: Vec<PhaseDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerCommands>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDocument {
    pub modules: Vec<ModuleSpec>,
}

/// Deserialize a YAML plan document without validating it.
pub fn load_document(source: &str) -> Result<PlanDocument, ParseError> {
    Ok(serde_yaml::from_str(source)?)
}

/// Validate a document and build the immutable `Plan`.
///
/// Checks, in order per module: reserved names, duplicate names, and that
/// every dependency resolves to a module declared in a strictly earlier
/// phase. A dependency on a same-phase sibling is a dangling dependency — the
/// phase barrier is the only ordering the scheduler provides.
pub fn plan_from_document(document: &PlanDocument) -> Result<Plan, ParseError> {
    if document.phases.is_empty() {
        return Err(ParseError::EmptyPlan);
    }

    let mut declared: HashSet<&str> = HashSet::new();
    let mut resolvable: HashSet<&str> = HashSet::new();
    let mut phases = Vec::with_capacity(document.phases.len());

    for (index, phase) in document.phases.iter().enumerate() {
        if phase.modules.is_empty() {
            return Err(ParseError::EmptyPhase { index });
        }
        for module in &phase.modules {
            if module.name == INTEGRATION_MODULE {
                return Err(ParseError::ReservedModuleName {
                    name: module.name.clone(),
                });
            }
            if !declared.insert(module.name.as_str()) {
                return Err(ParseError::DuplicateModule {
                    name: module.name.clone(),
                });
            }
            for dependency in &module.dependencies {
                if !resolvable.contains(dependency.as_str()) {
                    return Err(ParseError::DanglingDependency {
                        module: module.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        phases.push(Phase {
            index,
            modules: phase.modules.clone(),
        });
        // Only now do this phase's modules become legal dependency targets.
        for module in &phase.modules {
            resolvable.insert(module.name.as_str());
        }
    }

    Ok(Plan {
        id: document.id.clone(),
        phases,
    })
}

/// Parse a YAML plan document straight into a validated `Plan`.
pub fn parse(source: &str) -> Result<Plan, ParseError> {
    plan_from_document(&load_document(source)?)
}
