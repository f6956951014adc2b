//! Testing utilities: scripted workers for exercising the orchestrator
//! without real build tooling.

pub mod mocks;

pub use mocks::MockWorker;
