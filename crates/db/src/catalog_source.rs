//! Postgres-backed `catalog::CatalogSource` (§4.1, §6.1), assembled from
//! `repository::workflows` and `repository::tasks`.

use async_trait::async_trait;
use catalog::CatalogSource;
use engine::model::{TaskResource, WorkflowSpec};
use sqlx::PgPool;

use crate::repository::{tasks, workflows};

pub struct PgCatalogSource {
    pool: PgPool,
}

impl PgCatalogSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogSource for PgCatalogSource {
    async fn list_workflows(&self, namespace: Option<&str>) -> anyhow::Result<Vec<WorkflowSpec>> {
        workflows::list_workflows(&self.pool, namespace)
            .await?
            .into_iter()
            .map(workflows::row_into_spec)
            .collect()
    }

    async fn list_tasks(&self, namespace: Option<&str>) -> anyhow::Result<Vec<(String, TaskResource)>> {
        let rows = tasks::list_tasks(&self.pool, namespace).await?;
        rows.into_iter()
            .map(|row| {
                let task_ref = row.task_ref.clone();
                tasks::row_into_resource(row).map(|resource| (task_ref, resource))
            })
            .collect()
    }

    async fn get_workflow(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<Option<WorkflowSpec>> {
        match workflows::get_workflow(&self.pool, name).await? {
            Some(row) => Ok(Some(workflows::row_into_spec(row)?)),
            None => Ok(None),
        }
    }

    async fn get_task(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<Option<TaskResource>> {
        match tasks::get_task(&self.pool, name).await? {
            Some(row) => Ok(Some(tasks::row_into_resource(row)?)),
            None => Ok(None),
        }
    }
}
