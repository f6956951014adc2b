//! # Stagehand
//!
//! A phased, dependency-aware build orchestrator. Plans declare phases of
//! mutually independent modules; modules in a phase run concurrently through
//! a bounded build → validate → fix retry loop, phases advance in strict
//! order behind barriers, and a synthetic integration stage wires the
//! completed modules together at the end.
//!
//! The work itself is performed by an opaque [`worker::Worker`] capability —
//! shell commands, remote executors, humans behind a queue — so the
//! orchestrator only ever reasons about ordering, budgets, and failure
//! isolation.
//!
//! ## Modules
//!
//! - `plan` - plan model and YAML document parsing
//! - `worker` - the worker capability, submission pool, and shell-backed default
//! - `retry` - bounded retry loop driving one module to a terminal state
//! - `scheduler` - concurrent, barrier-synchronized phase execution
//! - `orchestrator` - top-level run state machine and build state
//! - `report` - final build report and exit-code mapping
//! - `error` - parse/worker/orchestration error taxonomy
//! - `testing` - scripted mock workers for tests

pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod worker;

pub mod testing;
