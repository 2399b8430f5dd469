//! `CatalogSource` (spec.md §6.1) — the narrow, external collaborator the
//! cache reads through. Production deployments back this with the cluster
//! catalog API; the `db` crate supplies a Postgres-backed reference
//! implementation, and [`StaticCatalogSource`] here backs tests and the
//! `cli validate`/demo paths.

use std::collections::HashMap;

use async_trait::async_trait;
use engine::model::{TaskResource, WorkflowSpec};

/// Read access to the cluster's declarative workflow/task resources.
///
/// Per §6.1, implementations must return snapshot-consistent lists; a
/// transient error is expected to yield an empty list so the cache falls
/// back to whatever it already has rather than evicting a good snapshot.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_workflows(&self, namespace: Option<&str>) -> anyhow::Result<Vec<WorkflowSpec>>;
    /// `TaskResource` itself carries no name (§3: it's a bare `{kind, ...}`
    /// leaf) — the catalog's own `taskRef` keys are the identity, so every
    /// listed resource is paired with the name it's registered under.
    async fn list_tasks(&self, namespace: Option<&str>) -> anyhow::Result<Vec<(String, TaskResource)>>;
    async fn get_workflow(&self, name: &str, namespace: Option<&str>) -> anyhow::Result<Option<WorkflowSpec>>;
    async fn get_task(&self, name: &str, namespace: Option<&str>) -> anyhow::Result<Option<TaskResource>>;
}

/// An in-memory `CatalogSource` populated up front. `namespace` is ignored —
/// every resource is visible regardless of the namespace a caller asks for,
/// which is adequate for tests and the single-tenant demo binary.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogSource {
    workflows: HashMap<String, WorkflowSpec>,
    tasks: HashMap<String, TaskResource>,
}

impl StaticCatalogSource {
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

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn list_workflows(&self, _namespace: Option<&str>) -> anyhow::Result<Vec<WorkflowSpec>> {
        Ok(self.workflows.values().cloned().collect())
    }

    async fn list_tasks(&self, _namespace: Option<&str>) -> anyhow::Result<Vec<(String, TaskResource)>> {
        Ok(self.tasks.iter().map(|(name, res)| (name.clone(), res.clone())).collect())
    }

    async fn get_workflow(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<Option<WorkflowSpec>> {
        Ok(self.workflows.get(name).cloned())
    }

    async fn get_task(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<Option<TaskResource>> {
        Ok(self.tasks.get(name).cloned())
    }
}
