//! Workflow definition storage — half of the optional Postgres-backed
//! `catalog::CatalogSource` reference implementation (§4.1, §6.1); see
//! `repository::tasks` for the other half. Real deployments may point
//! `CatalogCache` at the actual cluster catalog instead — this gives the
//! CLI/demo binary something to run against.

use chrono::Utc;
use engine::model::WorkflowSpec;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

pub async fn upsert_workflow(pool: &PgPool, spec: &WorkflowSpec) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let definition = serde_json::to_value(spec).map_err(|err| DbError::Serialization(err.to_string()))?;

    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        INSERT INTO workflows (id, name, namespace, definition, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT (name) DO UPDATE
            SET namespace = EXCLUDED.namespace, definition = EXCLUDED.definition, updated_at = EXCLUDED.updated_at
        RETURNING id, name, namespace, definition, created_at, updated_at
        "#,
        id,
        spec.name,
        spec.namespace,
        definition,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_workflow(pool: &PgPool, name: &str) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"SELECT id, name, namespace, definition, created_at, updated_at FROM workflows WHERE name = $1"#,
        name,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn list_workflows(pool: &PgPool, namespace: Option<&str>) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, name, namespace, definition, created_at, updated_at
        FROM workflows
        WHERE $1::text IS NULL OR namespace = $1
        ORDER BY name
        "#,
        namespace,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn delete_workflow(pool: &PgPool, name: &str) -> Result<(), DbError> {
    let result = sqlx::query!("DELETE FROM workflows WHERE name = $1", name).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

pub(crate) fn row_into_spec(row: WorkflowRow) -> anyhow::Result<WorkflowSpec> {
    Ok(serde_json::from_value(row.definition)?)
}
