//! Task resource storage — the other half of the optional Postgres-backed
//! `CatalogSource` (see `repository::workflows`). A `TaskResource` carries
//! no name of its own (§3), so it's registered here keyed by `taskRef`.

use chrono::Utc;
use engine::model::TaskResource;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::TaskResourceRow, DbError};

pub async fn upsert_task(pool: &PgPool, task_ref: &str, resource: &TaskResource) -> Result<TaskResourceRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let definition = serde_json::to_value(resource).map_err(|err| DbError::Serialization(err.to_string()))?;

    let row = sqlx::query_as!(
        TaskResourceRow,
        r#"
        INSERT INTO task_resources (id, task_ref, namespace, definition, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT (task_ref) DO UPDATE
            SET namespace = EXCLUDED.namespace, definition = EXCLUDED.definition, updated_at = EXCLUDED.updated_at
        RETURNING id, task_ref, namespace, definition, created_at, updated_at
        "#,
        id,
        task_ref,
        None::<String>,
        definition,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_task(pool: &PgPool, task_ref: &str) -> Result<Option<TaskResourceRow>, DbError> {
    let row = sqlx::query_as!(
        TaskResourceRow,
        r#"SELECT id, task_ref, namespace, definition, created_at, updated_at FROM task_resources WHERE task_ref = $1"#,
        task_ref,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn list_tasks(pool: &PgPool, namespace: Option<&str>) -> Result<Vec<TaskResourceRow>, DbError> {
    let rows = sqlx::query_as!(
        TaskResourceRow,
        r#"
        SELECT id, task_ref, namespace, definition, created_at, updated_at
        FROM task_resources
        WHERE $1::text IS NULL OR namespace = $1
        ORDER BY task_ref
        "#,
        namespace,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub(crate) fn row_into_resource(row: TaskResourceRow) -> anyhow::Result<TaskResource> {
    Ok(serde_json::from_value(row.definition)?)
}
