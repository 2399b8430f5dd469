//! `engine` crate — the workflow execution engine at the heart of the
//! gateway (spec.md §1). Everything here is a pure, injectable collaborator:
//! the catalog, recorder, and event sink are traits the `catalog`, `db`, and
//! `notify` crates implement, and `nodes` supplies the leaf executors the
//! orchestrator dispatches through.

pub mod anomaly;
pub mod catalog;
pub mod error;
pub mod events;
pub mod graph;
pub mod model;
pub mod orchestrator;
pub mod recorder;
pub mod stats;
pub mod template;
pub mod validate;

pub use catalog::{StaticCatalog, WorkflowCatalog};
pub use error::{EngineError, ExitCode};
pub use orchestrator::{ExecutionResult, Orchestrator, OrchestratorConfig};
pub use recorder::{ExecutionFilter, ExecutionRecorder, InMemoryRecorder};
pub use validate::{InputValidator, InvalidInput, MissingInput, ValidationResult};
