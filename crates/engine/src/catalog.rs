//! The narrow view of the cluster catalog the orchestrator needs (spec.md
//! §1, §6.1). The trait lives here so `engine` stays decoupled from however
//! definitions are actually sourced; the `catalog` crate's `CatalogCache`
//! implements it over a real `CatalogSource`, and tests implement it over a
//! plain `HashMap`.

use crate::model::{TaskResource, WorkflowSpec};

/// Read access to workflow and task definitions, keyed by name.
///
/// Implementations are expected to be cheap to clone (an `Arc` around a
/// snapshot, typically) since the orchestrator looks things up once per
/// dispatch rather than caching them itself.
pub trait WorkflowCatalog: Send + Sync {
    fn workflow(&self, name: &str) -> Option<WorkflowSpec>;
    fn task(&self, task_ref: &str) -> Option<TaskResource>;
}

/// An in-memory catalog populated up front, for tests and small demos.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    workflows: std::collections::HashMap<String, WorkflowSpec>,
    tasks: std::collections::HashMap<String, TaskResource>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow(mut self, spec: WorkflowSpec) -> Self {
        self.workflows.insert(spec.name.clone(), spec);
        self
    }

    pub fn with_task(mut self, task_ref: impl Into<String>, resource: TaskResource) -> Self {
        self.tasks.insert(task_ref.into(), resource);
        self
    }
}

impl WorkflowCatalog for StaticCatalog {
    fn workflow(&self, name: &str) -> Option<WorkflowSpec> {
        self.workflows.get(name).cloned()
    }

    fn task(&self, task_ref: &str) -> Option<TaskResource> {
        self.tasks.get(task_ref).cloned()
    }
}
